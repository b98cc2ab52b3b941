mod client;

pub use gemini_live_types as types;
pub use client::{
    connect, connect_with_config, Client, ClientTx, Config, ConfigBuilder, ServerEvent, ServerRx,
    Stats,
};

#[cfg(feature = "utils")]
pub use gemini_live_utils as utils;
