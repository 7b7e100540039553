use serde::Serialize;

/// Success envelope: `{ "success": true, "message"?, "count"?, "data" }`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            count: None,
            data,
        }
    }

    pub fn with_message(message: &'static str, data: T) -> Self {
        Self {
            message: Some(message),
            ..Self::ok(data)
        }
    }
}

impl<T> Envelope<Vec<T>> {
    pub fn list(data: Vec<T>) -> Self {
        Self {
            count: Some(data.len()),
            ..Self::ok(data)
        }
    }
}
