pub mod base;
pub mod button;
pub mod enumerator;
pub mod instance;
pub mod light;
pub mod number;
pub mod sensor;
pub mod switch;
