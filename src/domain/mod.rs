pub mod attempt;
pub mod money;
pub mod order;
pub mod ports;
pub mod remote;
pub mod terminal;
