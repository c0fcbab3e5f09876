#![forbid(unsafe_code)]

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    InvalidInput(&'static str),
    AccessDenied,
    PlantNotFound,
    ImageNotFound,
    PlantNotInCollection,
    LastAlbum,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::AccessDenied => write!(f, "collection not found or not owned by caller"),
            Self::PlantNotFound => write!(f, "plant not found"),
            Self::ImageNotFound => write!(f, "image not found"),
            Self::PlantNotInCollection => write!(f, "plant is not in this collection"),
            Self::LastAlbum => {
                write!(f, "cannot remove a plant from its only remaining collection")
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}
