use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::state::game::PlayerProfile;

/// Player profile as kept by the profile store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileEntity {
    /// Stable identifier referenced by players at join time.
    pub id: String,
    /// Name the profile was created with.
    pub display_name: String,
    /// CSS color string of the avatar.
    pub avatar_color: String,
    /// AI-generated stage name.
    pub artist_name: Option<String>,
    /// AI-generated music style blurb.
    pub music_style: Option<String>,
    /// Reference to the generated profile picture.
    pub profile_image: Option<String>,
    /// Creation time.
    pub created_at: SystemTime,
    /// Refreshed every time the profile joins a room.
    pub last_used_at: SystemTime,
}

impl From<ProfileEntity> for PlayerProfile {
    fn from(entity: ProfileEntity) -> Self {
        Self {
            avatar_color: Some(entity.avatar_color),
            artist_name: entity.artist_name,
            music_style: entity.music_style,
            profile_image: entity.profile_image,
        }
    }
}
