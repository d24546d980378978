use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

/// Identity of one concrete fish.
///
/// `entity_type` names the fish definition (its semantics), `name`
/// discriminates instances of the same definition ("lobby" vs "general"),
/// `version` changes whenever the definition's reducer changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FishId {
    pub entity_type: String,
    pub name: String,
    pub version: u32,
}

impl FishId {
    pub fn of(entity_type: impl Into<String>, name: impl Into<String>, version: u32) -> Self {
        Self {
            entity_type: entity_type.into(),
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for FishId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}@{}", self.entity_type, self.name, self.version)
    }
}

/// A concrete fish: its identity plus the state it starts from.
///
/// `S` is the state the runtime pushes for this fish and `C` the command type
/// it accepts. The reducer itself lives in the runtime; this value only
/// carries what a client needs to address the fish.
pub struct Fish<S, C> {
    id: FishId,
    initial_state: S,
    _command: PhantomData<fn(C)>,
}

impl<S, C> Fish<S, C> {
    pub fn new(id: FishId, initial_state: S) -> Self {
        Self {
            id,
            initial_state,
            _command: PhantomData,
        }
    }

    pub fn id(&self) -> &FishId {
        &self.id
    }

    pub fn initial_state(&self) -> &S {
        &self.initial_state
    }
}

impl<S: Serialize, C> Fish<S, C> {
    /// Initial state in the representation the runtime expects.
    pub fn initial_state_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(&self.initial_state)
    }
}

impl<S: Clone, C> Clone for Fish<S, C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            initial_state: self.initial_state.clone(),
            _command: PhantomData,
        }
    }
}

impl<S: fmt::Debug, C> fmt::Debug for Fish<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Fish")
            .field("id", &self.id)
            .field("initial_state", &self.initial_state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fish_id_equality_is_by_value() {
        let lobby = FishId::of("com.example.chatRoom", "lobby", 0);
        assert_eq!(lobby, FishId::of("com.example.chatRoom", "lobby", 0));
        assert_ne!(lobby, FishId::of("com.example.chatRoom", "general", 0));
        assert_ne!(lobby, FishId::of("com.example.chatRoom", "lobby", 1));
    }

    #[test]
    fn test_fish_id_serializes_camel_case() {
        let id = FishId::of("ax.goodFish", "reg", 2);
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json["entityType"], "ax.goodFish");
        assert_eq!(json["name"], "reg");
        assert_eq!(json["version"], 2);
    }

    #[test]
    fn test_initial_state_json() {
        let fish: Fish<Vec<String>, ()> =
            Fish::new(FishId::of("com.example.chatRoom", "lobby", 0), vec![]);
        assert_eq!(fish.initial_state_json().unwrap(), serde_json::json!([]));
        assert_eq!(fish.id().to_string(), "com.example.chatRoom/lobby@0");
    }
}
