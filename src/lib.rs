pub mod config;
pub mod leads;
pub mod main_module;
pub mod marketing;
pub mod shared;
