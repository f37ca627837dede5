pub mod commands;
pub mod connection;
pub mod conversion;
pub mod device;
pub mod entities;
pub mod modbus;
pub mod output;
pub mod registers;
