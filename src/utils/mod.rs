pub mod input_validation;
pub mod password_utils;
