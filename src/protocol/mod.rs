pub mod modbus;
pub mod register;
