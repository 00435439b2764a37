/// mDNS service type browsed for remote RTSP sources
pub const RTSP_SERVICE_TYPE: &str = "_rtsp._tcp.local.";

/// Path prefix used to describe a source by its advertised instance name
pub const BY_NAME_PREFIX: &str = "/by-name/";

/// API path prefix
pub const API_PREFIX: &str = "/v1";
