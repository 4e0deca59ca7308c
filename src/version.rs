use strum::Display;

use crate::error::{PatchError, Result};

/// Known retail builds of the host executable, identified by their link timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum BuildIdentity {
    /// 1.05 Brazilian
    #[strum(serialize = "1.05 Br")]
    Br,
    /// 1.05 Dutch, English, French, Italian, Portuguese, Spanish and Swedish
    #[strum(serialize = "1.05 En")]
    En,
    /// 1.05 German
    #[strum(serialize = "1.05 Ge")]
    Ge,
    /// 1.05 North American
    #[strum(serialize = "1.05 Na")]
    Na,
    /// 1.05 South American
    #[strum(serialize = "1.05 Sa")]
    Sa,
    /// 1.07 Trymedia release
    #[strum(serialize = "1.07 Trymedia")]
    Trymedia,
    #[strum(serialize = "unsupported")]
    Unsupported,
}

const KNOWN_BUILDS: [(u32, BuildIdentity); 6] = [
    (0x3528_DAFA, BuildIdentity::Br),
    (0x3528_DCB1, BuildIdentity::En),
    (0x3528_DB52, BuildIdentity::Ge),
    (0x3528_DA98, BuildIdentity::Na),
    (0x3528_DBDA, BuildIdentity::Sa),
    (0x3587_BE19, BuildIdentity::Trymedia),
];

impl BuildIdentity {
    pub fn from_fingerprint(fingerprint: u32) -> Self {
        KNOWN_BUILDS
            .iter()
            .find(|(known, _)| *known == fingerprint)
            .map(|(_, build)| *build)
            .unwrap_or(BuildIdentity::Unsupported)
    }

    /// Like [`BuildIdentity::from_fingerprint`], but unknown builds are an error.
    pub fn require(fingerprint: u32) -> Result<Self> {
        match Self::from_fingerprint(fingerprint) {
            BuildIdentity::Unsupported => Err(PatchError::UnsupportedBuild(fingerprint)),
            build => Ok(build),
        }
    }

    pub fn fingerprint(self) -> Option<u32> {
        KNOWN_BUILDS
            .iter()
            .find(|(_, build)| *build == self)
            .map(|(known, _)| *known)
    }

    pub fn is_supported(self) -> bool {
        self != BuildIdentity::Unsupported
    }

    /// Index used by C plugins, `-1` for unsupported builds.
    pub fn as_raw(self) -> i32 {
        match self {
            BuildIdentity::Br => 0,
            BuildIdentity::En => 1,
            BuildIdentity::Ge => 2,
            BuildIdentity::Na => 3,
            BuildIdentity::Sa => 4,
            BuildIdentity::Trymedia => 5,
            BuildIdentity::Unsupported => -1,
        }
    }
}
