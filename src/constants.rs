/// Provider identifier for Wealthsimple connections
pub const PROVIDER_WEALTHSIMPLE: &str = "wealthsimple";

/// Institution label applied to accounts created by the sync worker
pub const WEALTHSIMPLE_INSTITUTION: &str = "Wealthsimple";

/// Default OAuth2 token endpoint base
pub const WEALTHSIMPLE_AUTH_BASE_URL: &str = "https://api.production.wealthsimple.com";

/// Default GraphQL endpoint
pub const WEALTHSIMPLE_GRAPHQL_URL: &str = "https://my.wealthsimple.com/graphql";

/// OAuth client id sent on every token request
pub const WEALTHSIMPLE_CLIENT_ID: &str =
    "4da53ac2b03225bed1550eba8e4611e086c7b905a3855e6ed12ea08c246758fa";

/// Provider API version header value
pub const WS_API_VERSION: &str = "12";

/// GraphQL client library header value
pub const WS_CLIENT_LIBRARY: &str = "gql-sdk";

/// Locale header value
pub const WS_LOCALE: &str = "en-CA";

/// Platform header value
pub const WS_PLATFORM_OS: &str = "web";

/// Freshly issued access tokens expire after roughly thirty minutes
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 30 * 60;

/// Access tokens within this window of expiry are refreshed before use
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Per-request deadline for provider calls
pub const PROVIDER_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Scheduler tick interval (seconds) unless overridden by environment
pub const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 300;

/// Size of the background sync worker pool
pub const SYNC_WORKER_POOL_SIZE: usize = 4;

/// Environment variable holding the Base64-encoded 32-byte master key
pub const ENV_MASTER_KEY: &str = "ENC_MASTER_KEY";

/// Environment variable overriding the auth base URL
pub const ENV_AUTH_BASE_URL: &str = "WEALTHSIMPLE_AUTH_URL";

/// Environment variable overriding the GraphQL URL
pub const ENV_GRAPHQL_URL: &str = "WEALTHSIMPLE_GRAPHQL_URL";

/// Environment variable overriding the scheduler interval
pub const ENV_SCHEDULER_INTERVAL: &str = "SYNC_SCHEDULER_INTERVAL_SECS";
