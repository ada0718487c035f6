/// Derived physical quantities calculated from a RuuviTag reading
///
/// Every transform reads a few fields of a `Reading`, writes exactly one
/// derived field and returns the value it wrote. When a required input is
/// missing nothing is written and `None` is returned; sensors lacking a
/// capability are a normal condition, not an error.
use crate::models::Reading;

// Magnus formula constants (Pa, °C)
const MAGNUS_BASE_PA: f64 = 611.2;
const MAGNUS_A: f64 = 17.67;
const MAGNUS_B_C: f64 = 243.5;

const ZERO_CELSIUS_K: f64 = 273.15;
const WATER_VAPOR_GAS_FACTOR: f64 = 0.021674; // 1 / specific gas constant of water vapor, g·K/J
const DRY_AIR_DENSITY_STP: f64 = 1.2929; // kg/m³ at 0°C, 101.3 kPa
const VAPOR_PRESSURE_DENSITY_FACTOR: f64 = 0.3783;
const REFERENCE_PRESSURE_PA: f64 = 101300.0;

/// Temperature as an input: `None` only when the tag did not report one.
fn temperature(reading: &Reading) -> Option<f64> {
    reading.temperature
}

/// Relative humidity as an input.
///
/// A reading of exactly 0 % is treated the same as a missing humidity
/// sensor, so no humidity-dependent value is ever derived from it.
fn humidity(reading: &Reading) -> Option<f64> {
    reading.humidity.filter(|h| *h != 0.0)
}

/// Sum of the absolute axis accelerations, in the axes' raw unit (milli-g)
pub fn calculate_acceleration(reading: &mut Reading) -> Option<f64> {
    let x = reading.acceleration_x?;
    let y = reading.acceleration_y?;
    let z = reading.acceleration_z?;

    let acceleration = x.abs() + y.abs() + z.abs();
    reading.acceleration = Some(acceleration);
    Some(acceleration)
}

/// Calculate the equilibrium (saturation) vapor pressure of water
///
/// # Arguments
/// * `reading` - needs `temperature` (°C) and `humidity`
///
/// # Returns
/// The vapor pressure in Pa, also stored in `equilibrium_vapor_pressure`
pub fn calculate_equilibrium_vapor_pressure(reading: &mut Reading) -> Option<f64> {
    let t = temperature(reading)?;
    humidity(reading)?;

    let evp = MAGNUS_BASE_PA * (MAGNUS_A * t / (MAGNUS_B_C + t)).exp();
    reading.equilibrium_vapor_pressure = Some(evp);
    Some(evp)
}

/// Calculate the absolute humidity
///
/// # Arguments
/// * `reading` - needs `temperature`, `humidity` and a previously calculated
///   `equilibrium_vapor_pressure`
///
/// # Returns
/// The absolute humidity in g/m³
pub fn calculate_absolute_humidity(reading: &mut Reading) -> Option<f64> {
    let t = temperature(reading)?;
    let rh = humidity(reading)?;
    let evp = reading.equilibrium_vapor_pressure?;

    let absolute_humidity = evp * rh * WATER_VAPOR_GAS_FACTOR / (ZERO_CELSIUS_K + t);
    reading.absolute_humidity = Some(absolute_humidity);
    Some(absolute_humidity)
}

/// Calculate the density of moist air
///
/// # Arguments
/// * `reading` - needs `temperature`, `humidity`, `pressure` (Pa) and a
///   previously calculated `equilibrium_vapor_pressure`
///
/// # Returns
/// The air density in kg/m³
pub fn calculate_air_density(reading: &mut Reading) -> Option<f64> {
    let t = temperature(reading)?;
    let rh = humidity(reading)?;
    let pressure = reading.pressure?;
    let evp = reading.equilibrium_vapor_pressure?;

    let air_density = DRY_AIR_DENSITY_STP * ZERO_CELSIUS_K / (t + ZERO_CELSIUS_K)
        * (pressure - VAPOR_PRESSURE_DENSITY_FACTOR * rh / 100.0 * evp)
        / REFERENCE_PRESSURE_PA;
    reading.air_density = Some(air_density);
    Some(air_density)
}

/// Calculate the dew point
///
/// Inverts the Magnus formula on the actual vapor pressure
/// (`humidity / 100 * equilibrium_vapor_pressure`).
///
/// # Returns
/// The dew point in °C
pub fn calculate_dew_point(reading: &mut Reading) -> Option<f64> {
    temperature(reading)?;
    let rh = humidity(reading)?;
    let evp = reading.equilibrium_vapor_pressure?;

    let v = (rh / 100.0 * evp / MAGNUS_BASE_PA).ln();
    let dew_point = -MAGNUS_B_C * v / (v - MAGNUS_A);
    reading.dew_point = Some(dew_point);
    Some(dew_point)
}

/// Calculate the vapor-pressure deficit
///
/// Uses its own Clausius-Clapeyron approximation of the saturation pressure
/// and does not depend on `equilibrium_vapor_pressure`.
///
/// # Returns
/// The deficit in hPa, typically between 0 and 20 indoors
pub fn calculate_vapor_pressure_deficit(reading: &mut Reading) -> Option<f64> {
    let t = temperature(reading)?;
    let rh = humidity(reading)?;

    let ew = (13.7 - 5120.0 / (ZERO_CELSIUS_K + t)).exp() * 1000.0;
    let deficit = ew - rh / 100.0 * ew;
    reading.vapor_pressure_deficit = Some(deficit);
    Some(deficit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_reading() -> Reading {
        Reading {
            temperature: Some(21.99),
            humidity: Some(23.5),
            pressure: Some(100912.0),
            battery: Some(2965.0),
            acceleration_x: Some(-280.0),
            acceleration_y: Some(-956.0),
            acceleration_z: Some(36.0),
            ..Default::default()
        }
    }

    fn calculate_all(reading: &mut Reading) {
        calculate_acceleration(reading);
        calculate_equilibrium_vapor_pressure(reading);
        calculate_absolute_humidity(reading);
        calculate_air_density(reading);
        calculate_dew_point(reading);
        calculate_vapor_pressure_deficit(reading);
    }

    fn assert_close(actual: Option<f64>, expected: f64, tolerance: f64) {
        let actual = actual.expect("value should be present");
        assert!(
            (actual - expected).abs() < tolerance,
            "expected {} ± {}, got {}",
            expected,
            tolerance,
            actual
        );
    }

    #[test]
    fn test_full_sample() {
        let mut reading = sample_reading();
        calculate_all(&mut reading);

        assert_eq!(reading.acceleration, Some(1272.0));
        assert_close(reading.equilibrium_vapor_pressure, 2641.22, 0.01);
        assert_close(reading.absolute_humidity, 4.558, 0.001);
        assert_close(reading.air_density, 1.1892, 0.0001);
        assert_close(reading.dew_point, 0.212, 0.001);
        assert_close(reading.vapor_pressure_deficit, 19.929, 0.001);

        for value in [
            reading.absolute_humidity,
            reading.air_density,
            reading.dew_point,
            reading.vapor_pressure_deficit,
        ] {
            assert!(value.unwrap().is_finite());
        }
    }

    #[test]
    fn test_zero_humidity_is_treated_as_missing() {
        let mut reading = Reading {
            temperature: Some(20.0),
            humidity: Some(0.0),
            pressure: Some(101325.0),
            acceleration_x: Some(0.0),
            acceleration_y: Some(0.0),
            acceleration_z: Some(0.0),
            ..Default::default()
        };
        calculate_all(&mut reading);

        assert_eq!(reading.acceleration, Some(0.0));
        assert_eq!(reading.equilibrium_vapor_pressure, None);
        assert_eq!(reading.absolute_humidity, None);
        assert_eq!(reading.air_density, None);
        assert_eq!(reading.dew_point, None);
        assert_eq!(reading.vapor_pressure_deficit, None);
    }

    #[test]
    fn test_missing_humidity() {
        let mut reading = sample_reading();
        reading.humidity = None;
        calculate_all(&mut reading);

        assert!(reading.acceleration.is_some());
        assert_eq!(reading.equilibrium_vapor_pressure, None);
        assert_eq!(reading.vapor_pressure_deficit, None);
    }

    #[test]
    fn test_zero_temperature_is_a_value() {
        let mut reading = Reading {
            temperature: Some(0.0),
            humidity: Some(50.0),
            pressure: Some(101300.0),
            ..Default::default()
        };
        calculate_all(&mut reading);

        assert_eq!(reading.equilibrium_vapor_pressure, Some(611.2));
        assert!(reading.absolute_humidity.is_some());
        assert!(reading.air_density.is_some());
        assert!(reading.dew_point.unwrap() < 0.0);
        assert!(reading.vapor_pressure_deficit.is_some());
    }

    #[test]
    fn test_dependents_need_vapor_pressure_first() {
        let mut reading = sample_reading();

        assert_eq!(calculate_absolute_humidity(&mut reading), None);
        assert_eq!(calculate_air_density(&mut reading), None);
        assert_eq!(calculate_dew_point(&mut reading), None);
        assert_eq!(reading.absolute_humidity, None);
        assert_eq!(reading.air_density, None);
        assert_eq!(reading.dew_point, None);

        // Independent of the vapor pressure
        assert!(calculate_vapor_pressure_deficit(&mut reading).is_some());
    }

    #[test]
    fn test_air_density_needs_pressure() {
        let mut reading = sample_reading();
        reading.pressure = None;
        calculate_all(&mut reading);

        assert!(reading.equilibrium_vapor_pressure.is_some());
        assert!(reading.absolute_humidity.is_some());
        assert_eq!(reading.air_density, None);
    }

    #[test]
    fn test_missing_axis_leaves_acceleration_absent() {
        let mut reading = sample_reading();
        reading.acceleration_y = None;

        assert_eq!(calculate_acceleration(&mut reading), None);
        assert_eq!(reading.acceleration, None);
    }

    #[test]
    fn test_skipped_transform_keeps_previous_value() {
        let mut reading = sample_reading();
        calculate_all(&mut reading);
        let previous = reading.dew_point;

        reading.humidity = None;
        assert_eq!(calculate_dew_point(&mut reading), None);
        assert_eq!(reading.dew_point, previous);
    }

    #[test]
    fn test_returned_value_matches_field() {
        let mut reading = sample_reading();
        let evp = calculate_equilibrium_vapor_pressure(&mut reading);
        assert_eq!(evp, reading.equilibrium_vapor_pressure);
        let dew_point = calculate_dew_point(&mut reading);
        assert_eq!(dew_point, reading.dew_point);
    }

    #[test]
    fn test_saturated_air_dew_point_equals_temperature() {
        let mut reading = Reading {
            temperature: Some(15.0),
            humidity: Some(100.0),
            ..Default::default()
        };
        calculate_equilibrium_vapor_pressure(&mut reading);
        assert_close(calculate_dew_point(&mut reading), 15.0, 1e-9);
        assert_close(calculate_vapor_pressure_deficit(&mut reading), 0.0, 1e-9);
    }

    proptest! {
        #[test]
        fn proptest_acceleration_is_sum_of_magnitudes(
            x in -16000.0f64..16000.0,
            y in -16000.0f64..16000.0,
            z in -16000.0f64..16000.0
        ) {
            let mut reading = Reading {
                acceleration_x: Some(x),
                acceleration_y: Some(y),
                acceleration_z: Some(z),
                ..Default::default()
            };
            let acceleration = calculate_acceleration(&mut reading).unwrap();
            prop_assert_eq!(acceleration, x.abs() + y.abs() + z.abs());
            prop_assert!(acceleration >= 0.0);
        }

        #[test]
        fn proptest_vapor_pressure_positive_and_increasing(
            t in -40.0f64..84.0,
            step in 0.01f64..1.0,
            rh in 0.01f64..=100.0
        ) {
            let mut colder = Reading { temperature: Some(t), humidity: Some(rh), ..Default::default() };
            let mut warmer = Reading { temperature: Some(t + step), humidity: Some(rh), ..Default::default() };

            let low = calculate_equilibrium_vapor_pressure(&mut colder).unwrap();
            let high = calculate_equilibrium_vapor_pressure(&mut warmer).unwrap();
            prop_assert!(low > 0.0);
            prop_assert!(high > low);
        }

        #[test]
        fn proptest_recalculation_is_identical(
            t in -40.0f64..85.0,
            rh in 0.01f64..=100.0,
            p in 50000.0f64..115536.0
        ) {
            let mut reading = Reading {
                temperature: Some(t),
                humidity: Some(rh),
                pressure: Some(p),
                acceleration_x: Some(1.0),
                acceleration_y: Some(-2.0),
                acceleration_z: Some(1000.0),
                ..Default::default()
            };
            calculate_all(&mut reading);
            let first = reading.clone();
            calculate_all(&mut reading);
            prop_assert_eq!(first, reading);
        }
    }
}
