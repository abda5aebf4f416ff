pub mod device_reader;
pub mod quote_writer;
