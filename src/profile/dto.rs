use serde::{Deserialize, Deserializer};

/// Self-service profile update. `role` is accepted so that clients sending
/// it get a normal answer, but it is never applied.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    /// Absent: unchanged. `null`: removed.
    #[serde(default, deserialize_with = "double_option")]
    pub avatar: Option<Option<String>>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
    pub role: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteAccountRequest {
    #[serde(default)]
    pub password: String,
}

fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Deserialize::deserialize(de).map(Some)
}
