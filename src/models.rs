use serde::Serialize;

/// A single decoded RuuviTag sample plus the values derived from it.
///
/// Measured values are `None` when the tag's data format does not carry them
/// or the tag flagged them as invalid. Derived values stay `None` until the
/// matching transform in `metrics` has run with all of its inputs present.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>, // unix milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_format: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>, // °C
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>, // %
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>, // Pa
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<f64>, // mV
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceleration_x: Option<f64>, // milli-g
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceleration_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceleration_z: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_power: Option<i8>, // dBm
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movement_counter: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_sequence: Option<u16>,

    // Derived
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceleration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equilibrium_vapor_pressure: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolute_humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub air_density: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dew_point: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vapor_pressure_deficit: Option<f64>,
}

/// Every field that can be reported to Home Assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Temperature,
    Humidity,
    Pressure,
    Battery,
    Acceleration,
    AccelerationX,
    AccelerationY,
    AccelerationZ,
    Rssi,
    EquilibriumVaporPressure,
    AbsoluteHumidity,
    AirDensity,
    DewPoint,
    VaporPressureDeficit,
}

impl Metric {
    pub const ALL: [Metric; 14] = [
        Metric::Temperature,
        Metric::Humidity,
        Metric::Pressure,
        Metric::Battery,
        Metric::Acceleration,
        Metric::AccelerationX,
        Metric::AccelerationY,
        Metric::AccelerationZ,
        Metric::Rssi,
        Metric::EquilibriumVaporPressure,
        Metric::AbsoluteHumidity,
        Metric::AirDensity,
        Metric::DewPoint,
        Metric::VaporPressureDeficit,
    ];

    /// Key used in configuration files and `RUUVI_TAG_<N>_FIELDS`
    pub fn key(self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::Pressure => "pressure",
            Metric::Battery => "battery",
            Metric::Acceleration => "acceleration",
            Metric::AccelerationX => "accelerationX",
            Metric::AccelerationY => "accelerationY",
            Metric::AccelerationZ => "accelerationZ",
            Metric::Rssi => "rssi",
            Metric::EquilibriumVaporPressure => "equilibriumVaporPressure",
            Metric::AbsoluteHumidity => "absoluteHumidity",
            Metric::AirDensity => "airDensity",
            Metric::DewPoint => "dewPoint",
            Metric::VaporPressureDeficit => "vaporPressureDeficit",
        }
    }

    /// Parse a configuration key, accepting both camelCase and snake_case.
    pub fn from_key(key: &str) -> Option<Metric> {
        let normalized: String = key
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        Metric::ALL.into_iter().find(|m| {
            m.key().to_lowercase() == normalized
                // British spelling used by older configs
                || (*m == Metric::VaporPressureDeficit && normalized == "vapourpressuredeficit")
        })
    }

    /// Suffix of the Home Assistant entity id, e.g. `sensor.sauna_dew_point`
    pub fn entity_suffix(self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::Pressure => "pressure",
            Metric::Battery => "battery",
            Metric::Acceleration => "acceleration",
            Metric::AccelerationX => "acceleration_x",
            Metric::AccelerationY => "acceleration_y",
            Metric::AccelerationZ => "acceleration_z",
            Metric::Rssi => "rssi",
            Metric::EquilibriumVaporPressure => "equilibrium_vapor_pressure",
            Metric::AbsoluteHumidity => "absolute_humidity",
            Metric::AirDensity => "air_density",
            Metric::DewPoint => "dew_point",
            Metric::VaporPressureDeficit => "vapor_pressure_deficit",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Metric::Temperature | Metric::DewPoint => "°C",
            Metric::Humidity => "%",
            Metric::Pressure | Metric::EquilibriumVaporPressure => "Pa",
            Metric::Battery => "mV",
            Metric::Acceleration
            | Metric::AccelerationX
            | Metric::AccelerationY
            | Metric::AccelerationZ => "mg",
            Metric::Rssi => "dBm",
            Metric::AbsoluteHumidity => "g/m³",
            Metric::AirDensity => "kg/m³",
            Metric::VaporPressureDeficit => "hPa",
        }
    }

    /// Home Assistant device class, where one fits
    pub fn device_class(self) -> Option<&'static str> {
        match self {
            Metric::Temperature | Metric::DewPoint => Some("temperature"),
            Metric::Humidity => Some("humidity"),
            Metric::Pressure | Metric::EquilibriumVaporPressure | Metric::VaporPressureDeficit => {
                Some("pressure")
            }
            Metric::Battery => Some("voltage"),
            Metric::Rssi => Some("signal_strength"),
            _ => None,
        }
    }

    /// Decimal places kept when posting the state
    pub fn precision(self) -> usize {
        match self {
            Metric::AirDensity => 4,
            Metric::AbsoluteHumidity => 3,
            Metric::Pressure
            | Metric::Battery
            | Metric::Acceleration
            | Metric::AccelerationX
            | Metric::AccelerationY
            | Metric::AccelerationZ
            | Metric::Rssi => 0,
            _ => 2,
        }
    }

    /// Current value of this metric on the reading, if present.
    pub fn value(self, reading: &Reading) -> Option<f64> {
        match self {
            Metric::Temperature => reading.temperature,
            Metric::Humidity => reading.humidity,
            Metric::Pressure => reading.pressure,
            Metric::Battery => reading.battery,
            Metric::Acceleration => reading.acceleration,
            Metric::AccelerationX => reading.acceleration_x,
            Metric::AccelerationY => reading.acceleration_y,
            Metric::AccelerationZ => reading.acceleration_z,
            Metric::Rssi => reading.rssi.map(f64::from),
            Metric::EquilibriumVaporPressure => reading.equilibrium_vapor_pressure,
            Metric::AbsoluteHumidity => reading.absolute_humidity,
            Metric::AirDensity => reading.air_density,
            Metric::DewPoint => reading.dew_point,
            Metric::VaporPressureDeficit => reading.vapor_pressure_deficit,
        }
    }
}
