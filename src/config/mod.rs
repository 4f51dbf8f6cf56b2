pub mod settings;
pub mod validator;

pub use settings::Settings;
pub use validator::{validate, ValidationError};
