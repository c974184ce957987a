pub mod check_config;
pub mod info;
pub mod simulate;
pub mod still;
