//! Default values and the serde default functions that forward to them.

pub const DEFAULT_KEY_LENGTH: usize = 64;
pub const MIN_KEY_LENGTH: usize = 16;
pub const MAX_KEY_LENGTH: usize = 128;
pub const DEFAULT_MAX_KEY_ATTEMPTS: u32 = 10;
/// 14 days.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 14 * 24 * 60 * 60;
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60 * 60;
pub const DEFAULT_BCRYPT_COST: u32 = 13;
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

pub const DEFAULT_SQL_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_SQL_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_SQL_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SESSION_TABLE: &str = "user_sessions";
pub const DEFAULT_USER_TABLE: &str = "users";
pub const DEFAULT_USER_ID_TYPE: &str = "BIGINT NOT NULL";

pub const DEFAULT_REDIS_SESSION_PREFIX: &str = "skey:";
pub const DEFAULT_REDIS_USER_SET_PREFIX: &str = "usessions:";
pub const DEFAULT_REDIS_USER_PREFIX: &str = "user:";
pub const DEFAULT_REDIS_USER_ID_PREFIX: &str = "userID:";
pub const DEFAULT_REDIS_NEXT_ID_KEY: &str = "nxtUserid";

pub const SUPPORTED_SQL_SCHEMES: &[&str] = &[
    "postgres://",
    "postgresql://",
    "mysql://",
    "mariadb://",
    "sqlite:",
];

macro_rules! default_fns {
    ($($fn_name:ident => $const_name:ident : $ty:ty),* $(,)?) => {
        $(
            pub(crate) fn $fn_name() -> $ty {
                $const_name
            }
        )*
    };
}

macro_rules! default_string_fns {
    ($($fn_name:ident => $const_name:ident),* $(,)?) => {
        $(
            pub(crate) fn $fn_name() -> String {
                $const_name.to_string()
            }
        )*
    };
}

default_fns! {
    default_key_length            => DEFAULT_KEY_LENGTH: usize,
    default_max_key_attempts      => DEFAULT_MAX_KEY_ATTEMPTS: u32,
    default_session_ttl_secs      => DEFAULT_SESSION_TTL_SECS: u64,
    default_cleanup_interval_secs => DEFAULT_CLEANUP_INTERVAL_SECS: u64,
    default_bcrypt_cost           => DEFAULT_BCRYPT_COST: u32,
    default_sql_max_connections   => DEFAULT_SQL_MAX_CONNECTIONS: u32,
    default_sql_min_connections   => DEFAULT_SQL_MIN_CONNECTIONS: u32,
    default_sql_connect_timeout_secs => DEFAULT_SQL_CONNECT_TIMEOUT_SECS: u64,
}

default_string_fns! {
    default_session_table         => DEFAULT_SESSION_TABLE,
    default_user_table            => DEFAULT_USER_TABLE,
    default_user_id_type          => DEFAULT_USER_ID_TYPE,
    default_redis_session_prefix  => DEFAULT_REDIS_SESSION_PREFIX,
    default_redis_user_set_prefix => DEFAULT_REDIS_USER_SET_PREFIX,
    default_redis_user_prefix     => DEFAULT_REDIS_USER_PREFIX,
    default_redis_user_id_prefix  => DEFAULT_REDIS_USER_ID_PREFIX,
    default_redis_next_id_key     => DEFAULT_REDIS_NEXT_ID_KEY,
}
