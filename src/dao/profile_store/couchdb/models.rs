use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::dao::models::ProfileEntity;

pub const PROFILE_PREFIX: &str = "profile::";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchProfileDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub profile: ProfileBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileBody {
    pub display_name: String,
    pub avatar_color: String,
    #[serde(default)]
    pub artist_name: Option<String>,
    #[serde(default)]
    pub music_style: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
    pub created_at: SystemTime,
    pub last_used_at: SystemTime,
}

impl CouchProfileDocument {
    pub fn into_entity(self) -> ProfileEntity {
        let id = self
            .id
            .strip_prefix(PROFILE_PREFIX)
            .unwrap_or(&self.id)
            .to_string();
        ProfileEntity {
            id,
            display_name: self.profile.display_name,
            avatar_color: self.profile.avatar_color,
            artist_name: self.profile.artist_name,
            music_style: self.profile.music_style,
            profile_image: self.profile.profile_image,
            created_at: self.profile.created_at,
            last_used_at: self.profile.last_used_at,
        }
    }
}

pub fn profile_doc_id(id: &str) -> String {
    format!("{PROFILE_PREFIX}{id}")
}
