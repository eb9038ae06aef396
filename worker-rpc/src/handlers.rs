pub mod control_handler;

pub use control_handler::ControlHandler;
