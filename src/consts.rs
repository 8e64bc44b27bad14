pub const ANNOTATION_PREFIX: &str = "aliyun.archon.kubeup.com/";

// Option keys, relative to `ANNOTATION_PREFIX`.
pub const INTERNET_CHARGE_TYPE_ANN_NAME: &str = "internet-charge-type";
pub const BANDWIDTH_ANN_NAME: &str = "bandwidth";
pub const HEALTHY_THRESHOLD_ANN_NAME: &str = "healthy-threshold";
pub const UNHEALTHY_THRESHOLD_ANN_NAME: &str = "unhealthy-threshold";
pub const HEALTH_CHECK_CONNECT_TIMEOUT_ANN_NAME: &str = "health-check-connect-timeout";
pub const HEALTH_CHECK_INTERVAL_ANN_NAME: &str = "health-check-interval";
pub const BACKEND_PROTOCOL_ANN_NAME: &str = "load-balancer-backend-protocol";
pub const HTTP_HEALTH_CHECK_ANN_NAME: &str = "load-balancer-http-health-check";
pub const HTTP_HEALTH_CHECK_URI_ANN_NAME: &str = "load-balancer-http-health-check-uri";
pub const HTTP_HEALTH_CHECK_TIMEOUT_ANN_NAME: &str = "load-balancer-http-health-check-timeout";

// HTTP health check defaults.
pub const DEFAULT_HTTP_HEALTH_CHECK_URI: &str = "/";
pub const DEFAULT_HTTP_HEALTH_CHECK_TIMEOUT: i32 = 3;
pub const DEFAULT_HTTP_HEALTH_CHECK_INTERVAL: i32 = 5;
pub const DEFAULT_HTTP_HEALTHY_THRESHOLD: i32 = 4;
pub const DEFAULT_HTTP_UNHEALTHY_THRESHOLD: i32 = 4;
pub const HTTP_HEALTHY_CODES: &str = "http_2xx,http_3xx,http_4xx";

pub const MAX_BACKEND_WEIGHT: i32 = 100;
pub const MAX_LB_NAME_LEN: usize = 32;
pub const LB_ADDRESS_TYPE: &str = "internet";

pub const DEFAULT_CREATE_POLL_ATTEMPTS: u32 = 3;
pub const DEFAULT_CREATE_POLL_INTERVAL_SECS: u64 = 5;

pub const EXCLUDE_LB_NODE_LABEL: &str = "node.kubernetes.io/exclude-from-external-load-balancers";

pub const FINALIZER_NAME: &str = "kubeslb/finalizer";
