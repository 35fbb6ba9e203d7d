pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
pub const AUTO_SERVER_HOST: &str = "auto";
pub const USER_STATUS_PATH: &str = "/exa.language_server_pb.LanguageServerService/GetUserStatus";
pub const CSRF_TOKEN_HEADER: &str = "X-Codeium-Csrf-Token";
pub const CONNECT_PROTOCOL_HEADER: &str = "Connect-Protocol-Version";
pub const CONNECT_PROTOCOL_VERSION: &str = "1";
pub const PRODUCT_NAME: &str = "antigravity";

pub const DEFAULT_DETECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_DETECT_BASE_DELAY_MS: u64 = 1_500;
pub const DEFAULT_DETECT_MAX_DELAY_MS: u64 = 10_000;
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 8_000;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
