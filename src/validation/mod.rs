// Record validators used by the pipeline
//
// Each validator is a small pure component over the shared lookup tables,
// except the duplicate checker which asks the store.

pub mod duplicates;
pub mod geo;
pub mod postal_code;
pub mod province;

pub use duplicates::{DuplicateChecker, DuplicatePolicy};
pub use geo::{CoordinateValue, GeoValidator};
pub use postal_code::PostalCodeValidator;
pub use province::{fold_key, title_case, NameNormalizer};
