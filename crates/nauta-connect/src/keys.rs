//! Field names and endpoint paths fixed by the portal.

pub const CSRFHW: &str = "CSRFHW";
pub const ATTRIBUTE_UUID: &str = "ATTRIBUTE_UUID";
pub const WLANUSERIP: &str = "wlanuserip";
pub const SSID: &str = "ssid";
pub const LOGGER_ID: &str = "loggerId";
pub const DOMAIN: &str = "domain";
pub const USERNAME: &str = "username";
pub const PASSWORD: &str = "password";
pub const WLANACNAME: &str = "wlanacname";
pub const WLANMAC: &str = "wlanmac";
pub const FIRSTURL: &str = "firsturl";
pub const USERTYPE: &str = "usertype";
pub const GOTOPAGE: &str = "gotopage";
pub const SUCCESSPAGE: &str = "successpage";
pub const LANG: &str = "lang";
pub const OP: &str = "op";
pub const REMOVE: &str = "remove";

/// `op` value asking the portal for the remaining connection time.
pub const OP_GET_LEFT_TIME: &str = "getLeftTime";

/// Portal landing page carrying the hidden login form.
pub const PORTAL_ROOT_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/LoginServlet";
pub const QUERY_PATH: &str = "/EtecsaQueryServlet";
pub const LOGOUT_PATH: &str = "/LogoutServlet";

/// Path fragment present in the final URL after a successful login.
pub const ONLINE_MARKER: &str = "online.do";

/// Literal the logout endpoint returns on success.
pub const LOGOUT_SUCCESS_MARKER: &str = "SUCCESS";
