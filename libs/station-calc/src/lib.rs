//! station-calc - Decimal formula primitives for station sensors
//!
//! Pure functions used by the converter pipeline. All arithmetic is
//! [`rust_decimal::Decimal`]; nothing here touches `f64`.
//!
//! # Example
//!
//! ```rust
//! use rust_decimal::Decimal;
//! use station_calc::{adc_volts, divider_resistance, kelvin_to_fahrenheit, steinhart_hart_kelvin, SteinhartHart};
//!
//! let volts = adc_volts(Decimal::from(65536), Decimal::from(131072), Decimal::new(4096, 3)).unwrap();
//! let ohms = divider_resistance(volts, Decimal::new(4096, 3), Decimal::from(20000)).unwrap();
//! let kelvin = steinhart_hart_kelvin(ohms, &SteinhartHart::default()).unwrap();
//! let fahrenheit = kelvin_to_fahrenheit(kelvin).unwrap();
//! assert!(fahrenheit < Decimal::from(60));
//! ```
//!
//! # Functions
//!
//! | Function | Description |
//! |----------|-------------|
//! | `affine` | `value * multiply / divide + offset` |
//! | `adc_volts` | ADC counts to volts |
//! | `divider_resistance` | Sensing resistance of a voltage divider |
//! | `rtd_celsius` | Platinum RTD polynomial |
//! | `steinhart_hart_kelvin` | NTC thermistor curve |
//! | `celsius_to_fahrenheit`, `kelvin_to_fahrenheit` | Scale conversion |
//! | `combine_bytes` | Big-endian byte composition |
//! | `wind_chill_nws`, `wind_chill_siple` | Wind chill models |
//! | `round_half_even` | Banker's rounding |

pub mod error;
pub mod functions;

pub use error::{CalcError, Result};
pub use functions::{
    adc_volts, affine, celsius_to_fahrenheit, combine_bytes, divider_resistance,
    kelvin_to_fahrenheit, round_half_even, rtd_celsius, steinhart_hart_kelvin, wind_chill_nws,
    wind_chill_siple, SteinhartHart,
};
