use uuid::Uuid;

use crate::{Error, PolicySet};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct ApplicationId(pub Uuid);

/// An application that comment threads can be attached to
///
/// Applications are owned by the surrounding platform; this service only reads
/// their policies to decide who may open threads on them.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Application {
    pub id: ApplicationId,
    pub name: String,
    pub policies: PolicySet,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewApplication {
    pub id: ApplicationId,
    pub name: String,
    #[serde(default)]
    pub policies: PolicySet,
}

impl NewApplication {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.name)
    }
}
