use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for signup. Fields are optional so that a missing field is
/// reported as a 400 envelope instead of a deserialization failure.
#[derive(Debug, Default, Deserialize)]
pub struct SignupRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub username: Option<String>,
}

/// Request body for login.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// What the frontend keeps after any successful sign-in.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionPayload {
    pub email: String,
    pub token: String,
    pub role: String,
    pub username: String,
    #[serde(rename = "userId")]
    pub user_id: Uuid,
}

/// Public part of a user profile.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub username: String,
    pub email: String,
    pub image_url: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileImageResponse {
    pub image_url: String,
}
