/// Bluetooth Low Energy scanning and RuuviTag data decoding
use futures_util::StreamExt;
use log::{debug, error, warn};
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::time::{sleep, Duration};

use crate::models::Reading;

// RuuviTag protocol constants
const RUUVITAG_MANUFACTURER_ID: u16 = 0x0499; // Ruuvi Innovations Ltd. manufacturer ID
const DATA_FORMAT_3: u8 = 3; // RAWv1
const DATA_FORMAT_5: u8 = 5; // RAWv2
const DATA_FORMAT_3_LEN: usize = 14;
const DATA_FORMAT_5_LEN: usize = 24;
pub const SCAN_DURATION_SECS: u64 = 20; // How long to actively scan for devices

/// Decode RuuviTag manufacturer data into a reading
///
/// Dispatches on the data format byte. Formats other than 3 and 5 are
/// rejected. The returned reading carries no timestamp or RSSI; those come
/// from the scan itself.
pub fn decode_ruuvi_data(data: &[u8]) -> Option<Reading> {
    match (data.first(), data.len()) {
        (Some(&DATA_FORMAT_3), DATA_FORMAT_3_LEN) => Some(decode_format_3(data)),
        (Some(&DATA_FORMAT_5), DATA_FORMAT_5_LEN) => Some(decode_format_5(data)),
        (Some(&format), len) => {
            warn!("Unsupported RuuviTag data: len={}, format={}", len, format);
            None
        }
        (None, _) => None,
    }
}

/// Decode data format 3 (RAWv1), 14 bytes
///
/// - Byte 1: Humidity (unsigned, 0.5% resolution)
/// - Byte 2: Temperature integer part, MSB is the sign
/// - Byte 3: Temperature fraction (1/100 °C)
/// - Bytes 4-5: Pressure (unsigned 16-bit, +50000 Pa offset)
/// - Bytes 6-11: Acceleration X/Y/Z (signed 16-bit, milli-g)
/// - Bytes 12-13: Battery voltage (unsigned 16-bit, mV)
fn decode_format_3(data: &[u8]) -> Reading {
    let humidity = data[1] as f64 * 0.5;

    let magnitude = (data[2] & 0x7F) as f64 + data[3] as f64 / 100.0;
    let temperature = if data[2] & 0x80 != 0 { -magnitude } else { magnitude };

    let pressure = u16::from_be_bytes([data[4], data[5]]) as f64 + 50000.0;

    Reading {
        data_format: Some(DATA_FORMAT_3),
        temperature: Some(round(temperature, 2)),
        humidity: Some(humidity),
        pressure: Some(pressure),
        acceleration_x: Some(i16::from_be_bytes([data[6], data[7]]) as f64),
        acceleration_y: Some(i16::from_be_bytes([data[8], data[9]]) as f64),
        acceleration_z: Some(i16::from_be_bytes([data[10], data[11]]) as f64),
        battery: Some(u16::from_be_bytes([data[12], data[13]]) as f64),
        ..Default::default()
    }
}

/// Decode data format 5 (RAWv2), 24 bytes
///
/// - Bytes 1-2: Temperature (signed 16-bit, 0.005°C resolution)
/// - Bytes 3-4: Humidity (unsigned 16-bit, 0.0025% resolution)
/// - Bytes 5-6: Pressure (unsigned 16-bit, +50000 Pa offset, 1 Pa resolution)
/// - Bytes 7-12: Acceleration X/Y/Z (signed 16-bit, milli-g)
/// - Bytes 13-14: Battery voltage (11 bits, +1600 mV) and TX power (5 bits, 2 dBm steps from -40)
/// - Byte 15: Movement counter
/// - Bytes 16-17: Measurement sequence number
/// - Bytes 18-23: MAC address (not used here, we get it from BLE)
///
/// Every field has an all-ones (or 0x8000 for signed) "not available" value,
/// which decodes to `None`.
fn decode_format_5(data: &[u8]) -> Reading {
    let i16_at = |i: usize| i16::from_be_bytes([data[i], data[i + 1]]);
    let u16_at = |i: usize| u16::from_be_bytes([data[i], data[i + 1]]);
    let signed = |i: usize| Some(i16_at(i)).filter(|v| *v != i16::MIN);
    let unsigned = |i: usize| Some(u16_at(i)).filter(|v| *v != u16::MAX);

    // Humidity is capped at 100%
    let humidity = unsigned(3).map(|h| round((h as f64 * 0.0025).min(100.0), 2));

    let power_info = u16_at(13);
    let battery = Some(power_info >> 5)
        .filter(|v| *v != 0x7FF)
        .map(|v| v as f64 + 1600.0);
    let tx_power = Some(power_info & 0x1F)
        .filter(|v| *v != 0x1F)
        .map(|v| (v as i8) * 2 - 40);

    Reading {
        data_format: Some(DATA_FORMAT_5),
        temperature: signed(1).map(|t| round(t as f64 * 0.005, 3)),
        humidity,
        pressure: unsigned(5).map(|p| p as f64 + 50000.0),
        acceleration_x: signed(7).map(f64::from),
        acceleration_y: signed(9).map(f64::from),
        acceleration_z: signed(11).map(f64::from),
        battery,
        tx_power,
        movement_counter: Some(data[15]).filter(|m| *m != u8::MAX),
        measurement_sequence: unsigned(16),
        ..Default::default()
    }
}

fn round(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Scan for RuuviTag sensors and collect their data
///
/// This function performs a Bluetooth Low Energy scan and decodes the
/// advertised data of every device carrying Ruuvi manufacturer data,
/// configured or not, so the caller can point out unknown tags. The scan
/// runs for a fixed duration and returns all valid readings found.
///
/// # Returns
/// Result containing HashMap of upper-case sensor MAC -> Reading, or error if scan fails
pub async fn scan_for_ruuvitags() -> Result<HashMap<String, Reading>, Box<dyn std::error::Error>> {
    let mut data = HashMap::new();

    // Initialize Bluetooth session
    let session = match bluer::Session::new().await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to create Bluetooth session: {}", e);
            return Err(e.into());
        }
    };

    // Get the default Bluetooth adapter
    let adapter = match session.default_adapter().await {
        Ok(adapter) => adapter,
        Err(e) => {
            error!("Failed to get default Bluetooth adapter: {}", e);
            return Err(e.into());
        }
    };

    // Ensure Bluetooth adapter is powered on
    if let Err(e) = adapter.set_powered(true).await {
        error!("Failed to power on adapter: {}", e);
        return Err(e.into());
    }

    // Configure discovery filter for Low Energy devices only
    let filter = bluer::DiscoveryFilter {
        transport: bluer::DiscoveryTransport::Le,
        duplicate_data: false,
        ..Default::default()
    };

    // Apply the discovery filter (warn if it fails, but continue)
    if let Err(e) = adapter.set_discovery_filter(filter).await {
        warn!("Failed to set discovery filter: {}", e);
    }

    // Start device discovery in background
    let discovery_handle = match adapter.discover_devices().await {
        Ok(discovery_stream) => tokio::spawn(async move {
            let mut stream = discovery_stream;
            while let Some(event) = stream.next().await {
                debug!("Discovery event: {:?}", event);
            }
        }),
        Err(e) => {
            error!("Failed to start device discovery: {}", e);
            return Err(e.into());
        }
    };

    sleep(Duration::from_secs(SCAN_DURATION_SECS)).await;
    discovery_handle.abort();

    let devices = match adapter.device_addresses().await {
        Ok(devices) => devices,
        Err(e) => {
            error!("Failed to get device addresses: {}", e);
            return Err(e.into());
        }
    };

    let timestamp = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;

    for addr in devices {
        let device = match adapter.device(addr) {
            Ok(device) => device,
            Err(_) => continue,
        };

        let addr_str = device.address().to_string().to_uppercase();

        let manufacturer_data = match device.manufacturer_data().await {
            Ok(Some(manufacturer_data)) => manufacturer_data,
            Ok(None) => continue,
            Err(e) => {
                debug!("Failed to get manufacturer data for {}: {}", addr_str, e);
                continue;
            }
        };

        let Some(payload) = manufacturer_data.get(&RUUVITAG_MANUFACTURER_ID) else {
            continue;
        };

        if let Some(mut reading) = decode_ruuvi_data(payload) {
            reading.timestamp = Some(timestamp);
            reading.rssi = device.rssi().await.ok().flatten();
            debug!(
                "Received data from {}: temp={:?}°C, humidity={:?}%, pressure={:?} Pa, rssi={:?}",
                addr_str, reading.temperature, reading.humidity, reading.pressure, reading.rssi
            );
            data.insert(addr_str, reading);
        }
    }

    Ok(data)
}
