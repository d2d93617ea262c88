pub mod config;

pub use self::config::{
    MAX_TTL_MINUTES, env_lookup, load_config, load_config_with, parse_config, parse_config_with,
    read_config, read_config_with, validate_config,
};
