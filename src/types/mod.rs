//! Type definitions shared by training and serving

pub mod frame;
pub mod transaction;

pub use frame::{Frame, FrameError};
pub use transaction::{FieldError, FieldErrorKind, Transaction, ValidationError, FIELD_NAMES};
