pub mod binance_rest;
pub mod binance_ws;
