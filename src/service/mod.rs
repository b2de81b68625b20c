pub mod device;
pub mod hass;
pub mod hass_gc;
pub mod http;
pub mod state;
