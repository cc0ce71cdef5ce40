pub mod error;

pub mod config;

pub mod codec;
pub mod row;
pub mod value;

pub mod exec;

pub mod io {
    pub mod registry;

    pub mod worker;
}

mod connection;
pub use connection::*;

mod db;
pub use db::*;
