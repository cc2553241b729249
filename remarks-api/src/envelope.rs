use crate::Error;

/// Uniform wrapper around every comment endpoint's response
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Envelope<T> {
    pub status: u16,
    pub payload: Option<T>,
    pub error: Option<serde_json::Value>,
}

impl<T> Envelope<T> {
    pub fn success(status: http::StatusCode, payload: T) -> Envelope<T> {
        Envelope {
            status: status.as_u16(),
            payload: Some(payload),
            error: None,
        }
    }

    pub fn ok(payload: T) -> Envelope<T> {
        Self::success(http::StatusCode::OK, payload)
    }

    pub fn created(payload: T) -> Envelope<T> {
        Self::success(http::StatusCode::CREATED, payload)
    }

    pub fn failure(err: &Error) -> Envelope<T> {
        Envelope {
            status: err.status_code().as_u16(),
            payload: None,
            error: Some(err.details()),
        }
    }

    /// Client-side view of the envelope
    pub fn into_result(self) -> Result<T, Error> {
        if let Some(details) = self.error {
            return Err(Error::from_details(&details)
                .unwrap_or_else(|e| Error::Unknown(format!("unparseable error {details}: {e:#}"))));
        }
        self.payload
            .ok_or_else(|| Error::Unknown(String::from("response carried no payload")))
    }
}
