//! Built-in animated scenes.

use serde::{Deserialize, Serialize};

/// One of the nine built-in animated ("disco") scenes of RGBW-family bulbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneId {
    pub(crate) value: u8,
}

impl SceneId {
    const MIN: u8 = 1;
    const MAX: u8 = 9;

    /// Returns None if value is outside the valid range (1-9).
    ///
    /// # Examples
    ///
    /// ```
    /// use milight_rs::SceneId;
    ///
    /// assert!(SceneId::create(0).is_none());
    /// assert!(SceneId::create(1).is_some());
    /// assert!(SceneId::create(9).is_some());
    /// assert!(SceneId::create(10).is_none());
    /// ```
    pub fn create(value: u8) -> Option<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Some(SceneId { value })
        } else {
            None
        }
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    /// The scene after this one, wrapping from the last back to the first.
    ///
    /// # Examples
    ///
    /// ```
    /// use milight_rs::SceneId;
    ///
    /// assert_eq!(SceneId::create(3).unwrap().next().value(), 4);
    /// assert_eq!(SceneId::create(9).unwrap().next().value(), 1);
    /// ```
    pub fn next(&self) -> Self {
        SceneId {
            value: self.value % Self::MAX + 1,
        }
    }

    /// Scene shown when advancing from a zone that has no scene yet.
    pub fn first() -> Self {
        SceneId { value: Self::MIN }
    }
}
