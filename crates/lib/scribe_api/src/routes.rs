//! Route paths.

pub const POST_AUTH_SIGNUP_BASIC: &str = "/auth/signup/basic";
pub const POST_AUTH_SIGNIN_BASIC: &str = "/auth/signin/basic";
pub const DELETE_AUTH_SIGNOUT: &str = "/auth/signout";
pub const POST_AUTH_TOKEN_REFRESH: &str = "/auth/token/refresh";
pub const GET_PROFILE_MINE: &str = "/profile/mine";
pub const GET_PROFILE_ID: &str = "/profile/id/{id}";
