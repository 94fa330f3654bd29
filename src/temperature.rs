//! Functions to compute temperature from raw sensor values.
//!
//! The pipeline treats the conversion as opaque: it hands a
//! [`RadiometricConverter`] the oriented frame and the capture
//! metadata and gets a grid of temperatures back.
//!
//! [`PlanckConverter`] is the default. It reads the camera's
//! calibration constants from `sensor_fixed_metadata` and
//! corrects the object radiance for atmospheric transmission
//! and reflected ambient radiance before inverting the Planck
//! curve. Output is in Kelvin.

use anyhow::{anyhow, Result};
use ndarray::Array2;
use serde_derive::*;

use crate::{frame::OrientedFrame, metadata::CaptureMetadata};

/// Turns raw counts into calibrated temperatures.
pub trait RadiometricConverter {
    fn to_temperature(&self, frame: &OrientedFrame, metadata: &CaptureMetadata)
        -> Result<Array2<f64>>;
}

/// Calibration constants of a FLIR camera.
///
/// Upstream metadata stores these as strings, sometimes with a
/// unit suffix; plain numbers are accepted as well.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FlirCalibration {
    #[serde(rename = "calibration_R", deserialize_with = "serde_helpers::lenient_float")]
    planck_r: f64,
    #[serde(rename = "calibration_B", deserialize_with = "serde_helpers::lenient_float")]
    planck_b: f64,
    #[serde(rename = "calibration_F", deserialize_with = "serde_helpers::lenient_float")]
    planck_f: f64,
    #[serde(rename = "calibration_J0", deserialize_with = "serde_helpers::lenient_float")]
    offset_j0: f64,
    #[serde(rename = "calibration_J1", deserialize_with = "serde_helpers::lenient_float")]
    gain_j1: f64,

    #[serde(rename = "calibration_X", deserialize_with = "serde_helpers::lenient_float")]
    atmospheric_transmission_x: f64,
    #[serde(rename = "calibration_alpha1", deserialize_with = "serde_helpers::lenient_float")]
    atmospheric_transmission_alpha_1: f64,
    #[serde(rename = "calibration_alpha2", deserialize_with = "serde_helpers::lenient_float")]
    atmospheric_transmission_alpha_2: f64,
    #[serde(rename = "calibration_beta1", deserialize_with = "serde_helpers::lenient_float")]
    atmospheric_transmission_beta_1: f64,
    #[serde(rename = "calibration_beta2", deserialize_with = "serde_helpers::lenient_float")]
    atmospheric_transmission_beta_2: f64,
}

/// Scene conditions at capture time.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Environment {
    /// Air temperature in celsius.
    pub air_temperature: f64,
    /// Relative humidity as a fraction.
    pub relative_humidity: f64,
    /// Object distance in metres.
    pub distance: f64,
    pub emissivity: f64,
}

impl Default for Environment {
    fn default() -> Self {
        Environment {
            air_temperature: 22.,
            relative_humidity: 0.1,
            distance: 2.5,
            emissivity: 0.98,
        }
    }
}

const KELVIN_OFFSET: f64 = 273.15;

impl FlirCalibration {
    pub fn from_metadata(metadata: &CaptureMetadata) -> Result<Self> {
        let fixed = metadata
            .sensor_fixed_metadata()
            .ok_or_else(|| anyhow!("no sensor_fixed_metadata for {}", metadata.sensor()))?;
        Ok(serde_json::from_value(fixed.clone())?)
    }

    // rad = R*J1/(exp(B/T)-F) + J0, T in kelvin
    fn planck_temp_to_radiance(&self, kelvin: f64) -> f64 {
        self.planck_r * self.gain_j1 / ((self.planck_b / kelvin).exp() - self.planck_f)
            + self.offset_j0
    }

    // inverse of above
    fn planck_radiance_to_temp(&self, radiance: f64) -> f64 {
        self.planck_b
            / (self.planck_r / (radiance - self.offset_j0) * self.gain_j1 + self.planck_f).ln()
    }

    fn atmospheric_affine1(&self, val: f64) -> f64 {
        self.atmospheric_transmission_alpha_1 + self.atmospheric_transmission_beta_1 * val
    }

    fn atmospheric_affine2(&self, val: f64) -> f64 {
        self.atmospheric_transmission_alpha_2 + self.atmospheric_transmission_beta_2 * val
    }

    fn atmospheric_interpolate(&self, val1: f64, val2: f64) -> f64 {
        self.atmospheric_transmission_x * val1 + (1. - self.atmospheric_transmission_x) * val2
    }

    /// Atmospheric transmission over the object distance.
    pub fn transmission(&self, env: &Environment) -> f64 {
        // water vapour content from relative humidity
        const H2O_SERIES: [f64; 4] = [1.56, 0.0694, -0.000278, 0.000000685];
        let h2o = env.relative_humidity * power_series_at(&H2O_SERIES, env.air_temperature).exp();
        let h2o_sqrt = h2o.sqrt();

        let dist_factor = (env.distance / 2.).sqrt();
        self.atmospheric_interpolate(
            (-dist_factor * self.atmospheric_affine1(h2o_sqrt)).exp(),
            (-dist_factor * self.atmospheric_affine2(h2o_sqrt)).exp(),
        )
    }

    /// Per-pixel transform from raw counts to kelvin.
    pub fn temperature_transform(&self, env: &Environment) -> impl Fn(f64) -> f64 + '_ {
        let tau = self.transmission(env);
        let emissivity = env.emissivity;

        // the gantry camera looks through open air: atmosphere
        // and reflected ambient share the air temperature
        let air = env.air_temperature + KELVIN_OFFSET;
        let atm = self.planck_temp_to_radiance(air);
        let amb = self.planck_temp_to_radiance(air);

        let coeffs = [
            (-(1. - tau) * atm - (1. - emissivity) * tau * amb + self.offset_j0) / emissivity / tau,
            self.gain_j1 / emissivity / tau,
        ];

        move |raw| self.planck_radiance_to_temp(power_series_at(&coeffs, raw))
    }

    pub fn raw_to_temp(&self, env: &Environment, raw: f64) -> f64 {
        self.temperature_transform(env)(raw)
    }
}

/// Default converter driven by [`FlirCalibration`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanckConverter {
    pub environment: Environment,
}

impl RadiometricConverter for PlanckConverter {
    fn to_temperature(
        &self,
        frame: &OrientedFrame,
        metadata: &CaptureMetadata,
    ) -> Result<Array2<f64>> {
        let calibration = FlirCalibration::from_metadata(metadata)?;
        let transform = calibration.temperature_transform(&self.environment);
        Ok(frame.values().mapv(transform))
    }
}

#[inline]
fn power_series_at(coeffs: &[f64], x: f64) -> f64 {
    let mut pow = 1.;
    let mut sum = 0.;
    for coeff in coeffs.iter() {
        sum += pow * coeff;
        pow *= x;
    }
    sum
}

mod serde_helpers {
    use lazy_static::lazy_static;
    use regex::Regex;
    use serde::*;

    #[derive(serde_derive::Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    /// Accept `16671`, `"16671"` or `"22.5 C"`.
    pub fn lenient_float<'de, D>(de: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        lazy_static! {
            static ref RE: Regex = Regex::new(r"^\s*[-+]?(\d+\.?\d*|\.\d+)([eE][-+]?\d+)?").unwrap();
        }

        use serde::de::Error;
        let str_rep = match NumberOrString::deserialize(de)? {
            NumberOrString::Number(val) => return Ok(val),
            NumberOrString::String(s) => s,
        };
        let val = RE
            .find(&str_rep)
            .ok_or_else(|| Error::custom("unexpected format: must begin with float"))?
            .as_str()
            .trim()
            .parse()
            .map_err(Error::custom)?;

        Ok(val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tests::capture_content;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use serde_json::json;

    fn calibration() -> FlirCalibration {
        serde_json::from_value(json!({
            "calibration_R": "16671",
            "calibration_B": 1428.0,
            "calibration_F": "1.0",
            "calibration_J0": "0",
            "calibration_J1": "1",
            "calibration_X": "1.9",
            "calibration_alpha1": "0.006569",
            "calibration_alpha2": "0.01262",
            "calibration_beta1": "-0.002276",
            "calibration_beta2": "-0.00667 1/sqrt(g/m3)"
        }))
        .unwrap()
    }

    fn ideal() -> Environment {
        // unit emissivity through a vacuum
        Environment {
            air_temperature: 20.,
            relative_humidity: 0.,
            distance: 0.,
            emissivity: 1.,
        }
    }

    #[test]
    fn lenient_parsing() {
        let cal = calibration();
        assert_eq!(cal.planck_r, 16671.);
        assert_eq!(cal.planck_b, 1428.);
        assert_eq!(cal.atmospheric_transmission_beta_2, -0.00667);

        let bad = serde_json::from_value::<FlirCalibration>(json!({ "calibration_R": "abc" }));
        assert!(bad.is_err());
    }

    #[test]
    fn ideal_conditions_invert_planck() {
        let cal = calibration();
        let env = ideal();
        assert_abs_diff_eq!(cal.transmission(&env), 1.0, epsilon = 1e-12);

        for kelvin in [260., 300., 330.] {
            let raw = cal.planck_temp_to_radiance(kelvin);
            assert_abs_diff_eq!(cal.raw_to_temp(&env, raw), kelvin, epsilon = 1e-9);
        }
    }

    #[test]
    fn object_at_air_temperature_reads_air_temperature() {
        // with the object in equilibrium with its surroundings
        // every correction term cancels out
        let cal = calibration();
        let env = Environment::default();
        let air = env.air_temperature + KELVIN_OFFSET;
        let raw = cal.planck_temp_to_radiance(air);
        assert_abs_diff_eq!(cal.raw_to_temp(&env, raw), air, epsilon = 1e-6);
    }

    #[test]
    fn transmission_drops_with_distance() {
        let cal = calibration();
        let near = cal.transmission(&Environment {
            distance: 1.,
            ..Default::default()
        });
        let far = cal.transmission(&Environment {
            distance: 100.,
            ..Default::default()
        });
        assert!(near > far);
    }

    #[test]
    fn converter_reads_calibration_from_metadata() -> Result<()> {
        let md = CaptureMetadata::from_content(&capture_content(), "flirIrCamera").unwrap();
        let cal = FlirCalibration::from_metadata(&md)?;
        let converter = PlanckConverter {
            environment: ideal(),
        };

        let raw = cal.planck_temp_to_radiance(300.);
        let frame = OrientedFrame::new(array![[raw, raw], [raw, raw], [raw, raw]]);
        let temps = converter.to_temperature(&frame, &md)?;
        assert_eq!(temps.dim(), (3, 2));
        for t in temps.iter() {
            assert_abs_diff_eq!(*t, 300., epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn missing_calibration_is_an_error() {
        let md = CaptureMetadata::from_content(&json!({}), "flirIrCamera").unwrap();
        let frame = OrientedFrame::new(Array2::zeros((2, 2)));
        assert!(PlanckConverter::default().to_temperature(&frame, &md).is_err());
    }
}
