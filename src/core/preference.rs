//! Per-identity preference documents.
//!
//! Enumerated settings arrive as raw strings in a [`PreferenceUpdate`] and are
//! checked against their allowed value sets by [`PreferenceUpdate::validate`]
//! before anything reaches storage.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::{StoreError, StoreResult};
use crate::core::ids::PreferenceId;
use crate::core::owner::Owner;

/// Maximum length of `customPrompt`, in characters.
pub const MAX_CUSTOM_PROMPT_CHARS: usize = 500;

/// Language used when none was chosen.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Implement `as_str`, `Display`, and a validating `FromStr` for a closed set of values.
macro_rules! impl_choice {
    ($name:ident, field = $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Every accepted value.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Stable string representation.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = StoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(StoreError::validation(format!(
                        "{} must be one of [{}], got {other:?}",
                        $field,
                        [$($text),+].join(", ")
                    ))),
                }
            }
        }
    };
}

/// Colour scheme of the client.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Light scheme.
    Light,
    /// Dark scheme.
    Dark,
    /// Follow the operating system.
    #[default]
    System,
}

impl_choice!(Theme, field = "theme", {
    Light => "light",
    Dark => "dark",
    System => "system",
});

/// Text size of the client.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontSize {
    /// Small text.
    Small,
    /// Medium text.
    #[default]
    Medium,
    /// Large text.
    Large,
}

impl_choice!(FontSize, field = "fontSize", {
    Small => "small",
    Medium => "medium",
    Large => "large",
});

/// Tone the assistant answers in.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiResponseStyle {
    /// Short answers.
    Concise,
    /// Long, thorough answers.
    Detailed,
    /// Warm, encouraging answers.
    #[default]
    Supportive,
}

impl_choice!(AiResponseStyle, field = "aiResponseStyle", {
    Concise => "concise",
    Detailed => "detailed",
    Supportive => "supportive",
});

/// Preference document for one owner.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preference {
    /// Storage id; `None` for an unpersisted default document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<PreferenceId>,
    /// Single owner, serialized as `userId` or `guestId`.
    #[serde(flatten)]
    pub owner: Owner,
    /// Colour scheme.
    pub theme: Theme,
    /// Text size.
    pub font_size: FontSize,
    /// Assistant tone.
    pub ai_response_style: AiResponseStyle,
    /// Interface language.
    pub language: String,
    /// Whether notifications are shown.
    pub notifications_enabled: bool,
    /// Whether sounds are played.
    pub sound_enabled: bool,
    /// Extra instructions for the assistant.
    pub custom_prompt: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Preference {
    /// Structurally complete default document for an owner. Not persisted.
    #[must_use]
    pub fn defaults_for(owner: Owner, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            owner,
            theme: Theme::default(),
            font_size: FontSize::default(),
            ai_response_style: AiResponseStyle::default(),
            language: DEFAULT_LANGUAGE.to_string(),
            notifications_enabled: true,
            sound_enabled: true,
            custom_prompt: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this document exists in storage.
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

/// Partial preference write as received from a client. Unset fields are left alone.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceUpdate {
    /// `light`, `dark`, or `system`.
    pub theme: Option<String>,
    /// `small`, `medium`, or `large`.
    pub font_size: Option<String>,
    /// `concise`, `detailed`, or `supportive`.
    pub ai_response_style: Option<String>,
    /// Free-text language tag.
    pub language: Option<String>,
    /// Notification toggle.
    pub notifications_enabled: Option<bool>,
    /// Sound toggle.
    pub sound_enabled: Option<bool>,
    /// Free text, at most [`MAX_CUSTOM_PROMPT_CHARS`] characters.
    pub custom_prompt: Option<String>,
}

impl PreferenceUpdate {
    /// Check every provided field against its allowed values.
    ///
    /// # Errors
    /// Returns a validation error for an unknown enumerated value or an
    /// oversized `customPrompt`.
    pub fn validate(&self) -> StoreResult<PreferencePatch> {
        let custom_prompt = self.custom_prompt.clone();
        if let Some(prompt) = &custom_prompt {
            let chars = prompt.chars().count();
            if chars > MAX_CUSTOM_PROMPT_CHARS {
                return Err(StoreError::validation(format!(
                    "customPrompt must be at most {MAX_CUSTOM_PROMPT_CHARS} characters, got {chars}"
                )));
            }
        }

        Ok(PreferencePatch {
            theme: self.theme.as_deref().map(str::parse).transpose()?,
            font_size: self.font_size.as_deref().map(str::parse).transpose()?,
            ai_response_style: self.ai_response_style.as_deref().map(str::parse).transpose()?,
            language: self.language.clone(),
            notifications_enabled: self.notifications_enabled,
            sound_enabled: self.sound_enabled,
            custom_prompt,
        })
    }
}

/// Validated partial preference write.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PreferencePatch {
    /// New theme.
    pub theme: Option<Theme>,
    /// New font size.
    pub font_size: Option<FontSize>,
    /// New response style.
    pub ai_response_style: Option<AiResponseStyle>,
    /// New language.
    pub language: Option<String>,
    /// New notification toggle.
    pub notifications_enabled: Option<bool>,
    /// New sound toggle.
    pub sound_enabled: Option<bool>,
    /// New custom prompt.
    pub custom_prompt: Option<String>,
}

impl PreferencePatch {
    /// Merge the patch into a document, leaving unset fields untouched.
    pub fn apply_to(&self, preference: &mut Preference) {
        if let Some(theme) = self.theme {
            preference.theme = theme;
        }
        if let Some(font_size) = self.font_size {
            preference.font_size = font_size;
        }
        if let Some(style) = self.ai_response_style {
            preference.ai_response_style = style;
        }
        if let Some(language) = &self.language {
            preference.language.clone_from(language);
        }
        if let Some(enabled) = self.notifications_enabled {
            preference.notifications_enabled = enabled;
        }
        if let Some(enabled) = self.sound_enabled {
            preference.sound_enabled = enabled;
        }
        if let Some(prompt) = &self.custom_prompt {
            preference.custom_prompt.clone_from(prompt);
        }
    }
}
