#![forbid(unsafe_code)]

pub mod ids {
    /// Identifier of the authenticated caller, as supplied by the outer
    /// HTTP/auth layer. Validated once at the boundary so the storage
    /// layer can treat it as a plain string key.
    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    pub struct UserId(String);

    impl UserId {
        pub fn as_str(&self) -> &str {
            &self.0
        }

        pub fn try_new(value: impl Into<String>) -> Result<Self, UserIdError> {
            let value = value.into();
            validate_user_id(&value)?;
            Ok(Self(value))
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum UserIdError {
        Empty,
        TooLong,
        InvalidFirstChar,
        InvalidChar { ch: char, index: usize },
    }

    fn validate_user_id(value: &str) -> Result<(), UserIdError> {
        if value.is_empty() {
            return Err(UserIdError::Empty);
        }
        if value.len() > 128 {
            return Err(UserIdError::TooLong);
        }
        let mut chars = value.chars();
        let Some(first) = chars.next() else {
            return Err(UserIdError::Empty);
        };
        if !first.is_ascii_alphanumeric() {
            return Err(UserIdError::InvalidFirstChar);
        }
        for (index, ch) in value.chars().enumerate() {
            if index == 0 {
                continue;
            }
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                continue;
            }
            return Err(UserIdError::InvalidChar { ch, index });
        }
        Ok(())
    }
}

pub mod slug {
    /// Slug of the per-user fallback collection. Slugs are unique per
    /// owner, so every user gets exactly one.
    pub const UNCATEGORIZED_SLUG: &str = "uncategorized";
    pub const UNCATEGORIZED_NAME: &str = "Uncategorized";

    pub const MAX_SLUG_LEN: usize = 96;

    /// Derive a URL-safe slug from a display name: lowercase, runs of
    /// non-alphanumeric characters collapse to a single `-`, edges
    /// trimmed. Returns `None` when nothing survives (e.g. an
    /// all-punctuation name).
    pub fn slugify(name: &str) -> Option<String> {
        let mut out = String::new();
        let mut pending_dash = false;
        for ch in name.chars() {
            if ch.is_ascii_alphanumeric() {
                if pending_dash && !out.is_empty() {
                    out.push('-');
                }
                pending_dash = false;
                out.push(ch.to_ascii_lowercase());
            } else {
                pending_dash = true;
            }
        }
        if out.is_empty() {
            return None;
        }
        out.truncate(MAX_SLUG_LEN);
        while out.ends_with('-') {
            out.pop();
        }
        Some(out)
    }

    pub fn is_valid_slug(value: &str) -> bool {
        if value.is_empty() || value.len() > MAX_SLUG_LEN {
            return false;
        }
        if value.starts_with('-') || value.ends_with('-') {
            return false;
        }
        let mut prev_dash = false;
        for ch in value.chars() {
            if ch == '-' {
                if prev_dash {
                    return false;
                }
                prev_dash = true;
                continue;
            }
            prev_dash = false;
            if !ch.is_ascii_alphanumeric() || ch.is_ascii_uppercase() {
                return false;
            }
        }
        true
    }
}

pub mod model {
    use crate::slug;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum EntityKind {
        Collection,
        Plant,
        Image,
    }

    impl EntityKind {
        pub fn as_str(self) -> &'static str {
            match self {
                EntityKind::Collection => "collection",
                EntityKind::Plant => "plant",
                EntityKind::Image => "image",
            }
        }

        /// Prefix used when minting ids for this entity.
        pub fn id_prefix(self) -> &'static str {
            match self {
                EntityKind::Collection => "col",
                EntityKind::Plant => "plt",
                EntityKind::Image => "img",
            }
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Collection {
        owner: String,
        id: String,
        name: String,
        slug: String,
        description: Option<String>,
        thumbnail_image_id: Option<String>,
        created_at_ms: i64,
        updated_at_ms: i64,
    }

    impl Collection {
        #[allow(clippy::too_many_arguments)]
        pub fn try_new(
            owner: String,
            id: String,
            name: String,
            slug_value: String,
            description: Option<String>,
            thumbnail_image_id: Option<String>,
            created_at_ms: i64,
            updated_at_ms: i64,
        ) -> Result<Self, ModelError> {
            if owner.is_empty() || id.is_empty() {
                return Err(ModelError::EmptyId);
            }
            if name.trim().is_empty() {
                return Err(ModelError::EmptyName);
            }
            if !slug::is_valid_slug(&slug_value) {
                return Err(ModelError::InvalidSlug);
            }
            Ok(Self {
                owner,
                id,
                name,
                slug: slug_value,
                description,
                thumbnail_image_id,
                created_at_ms,
                updated_at_ms,
            })
        }

        pub fn owner(&self) -> &str {
            &self.owner
        }

        pub fn id(&self) -> &str {
            &self.id
        }

        pub fn name(&self) -> &str {
            &self.name
        }

        pub fn slug(&self) -> &str {
            &self.slug
        }

        pub fn description(&self) -> Option<&str> {
            self.description.as_deref()
        }

        pub fn thumbnail_image_id(&self) -> Option<&str> {
            self.thumbnail_image_id.as_deref()
        }

        pub fn created_at_ms(&self) -> i64 {
            self.created_at_ms
        }

        pub fn updated_at_ms(&self) -> i64 {
            self.updated_at_ms
        }

        pub fn is_uncategorized(&self) -> bool {
            self.slug == slug::UNCATEGORIZED_SLUG
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Plant {
        owner: String,
        id: String,
        name: String,
        species: Option<String>,
        original_collection_id: Option<String>,
        created_at_ms: i64,
        updated_at_ms: i64,
    }

    impl Plant {
        pub fn try_new(
            owner: String,
            id: String,
            name: String,
            species: Option<String>,
            original_collection_id: Option<String>,
            created_at_ms: i64,
            updated_at_ms: i64,
        ) -> Result<Self, ModelError> {
            if owner.is_empty() || id.is_empty() {
                return Err(ModelError::EmptyId);
            }
            if name.trim().is_empty() {
                return Err(ModelError::EmptyName);
            }
            Ok(Self {
                owner,
                id,
                name,
                species,
                original_collection_id,
                created_at_ms,
                updated_at_ms,
            })
        }

        pub fn owner(&self) -> &str {
            &self.owner
        }

        pub fn id(&self) -> &str {
            &self.id
        }

        pub fn name(&self) -> &str {
            &self.name
        }

        pub fn species(&self) -> Option<&str> {
            self.species.as_deref()
        }

        pub fn original_collection_id(&self) -> Option<&str> {
            self.original_collection_id.as_deref()
        }

        pub fn created_at_ms(&self) -> i64 {
            self.created_at_ms
        }

        pub fn updated_at_ms(&self) -> i64 {
            self.updated_at_ms
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Image {
        id: String,
        plant_id: String,
        url: String,
        is_main: bool,
        created_at_ms: i64,
    }

    impl Image {
        pub fn try_new(
            id: String,
            plant_id: String,
            url: String,
            is_main: bool,
            created_at_ms: i64,
        ) -> Result<Self, ModelError> {
            if id.is_empty() || plant_id.is_empty() {
                return Err(ModelError::EmptyId);
            }
            if url.trim().is_empty() {
                return Err(ModelError::EmptyUrl);
            }
            Ok(Self {
                id,
                plant_id,
                url,
                is_main,
                created_at_ms,
            })
        }

        pub fn id(&self) -> &str {
            &self.id
        }

        pub fn plant_id(&self) -> &str {
            &self.plant_id
        }

        pub fn url(&self) -> &str {
            &self.url
        }

        pub fn is_main(&self) -> bool {
            self.is_main
        }

        pub fn created_at_ms(&self) -> i64 {
            self.created_at_ms
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum ModelError {
        EmptyId,
        EmptyName,
        EmptyUrl,
        InvalidSlug,
    }
}

#[cfg(test)]
mod tests {
    use super::ids::{UserId, UserIdError};
    use super::model::Collection;
    use super::slug::{UNCATEGORIZED_SLUG, is_valid_slug, slugify};

    #[test]
    fn user_id_accepts_plain_identifiers() {
        assert!(UserId::try_new("alice").is_ok());
        assert!(UserId::try_new("user-42.prod_a").is_ok());
    }

    #[test]
    fn user_id_rejects_bad_shapes() {
        assert_eq!(UserId::try_new(""), Err(UserIdError::Empty));
        assert_eq!(UserId::try_new("-alice"), Err(UserIdError::InvalidFirstChar));
        assert_eq!(
            UserId::try_new("al ice"),
            Err(UserIdError::InvalidChar { ch: ' ', index: 2 })
        );
        assert_eq!(UserId::try_new("a".repeat(129)), Err(UserIdError::TooLong));
    }

    #[test]
    fn slugify_collapses_and_lowercases() {
        assert_eq!(slugify("My Garden!"), Some("my-garden".to_string()));
        assert_eq!(slugify("  Succulents & Cacti  "), Some("succulents-cacti".to_string()));
        assert_eq!(slugify("émoji 🌱 bed"), Some("moji-bed".to_string()));
        assert_eq!(slugify("!!!"), None);
    }

    #[test]
    fn slug_validation_matches_slugify_output() {
        for name in ["My Garden", "a", "Window Sill #2"] {
            let s = slugify(name).expect("slugify");
            assert!(is_valid_slug(&s), "slugify output must validate: {s}");
        }
        let long = slugify(&"a ".repeat(80)).expect("slugify long");
        assert!(long.len() <= 96);
        assert!(is_valid_slug(&long), "truncated slug must validate: {long}");
        assert!(is_valid_slug(UNCATEGORIZED_SLUG));
        assert!(!is_valid_slug("-leading"));
        assert!(!is_valid_slug("double--dash"));
        assert!(!is_valid_slug("Upper"));
    }

    #[test]
    fn collection_try_new_rejects_invalid_slug() {
        let result = Collection::try_new(
            "alice".to_string(),
            "col_0001".to_string(),
            "My Garden".to_string(),
            "My Garden".to_string(),
            None,
            None,
            0,
            0,
        );
        assert!(result.is_err());
    }
}
