use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CycleStateError {
    #[error("no state stored under {0:?}")]
    NotFound(String),
    #[error("state under {0:?} was already written this cycle")]
    AlreadyWritten(String),
    #[error("state under {0:?} has an unexpected type")]
    WrongType(String),
}

/// Data a plugin can keep in the cycle state.
pub trait StateData: Any + Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync + Debug> StateData for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Attempt-local storage shared by the stages of one scheduling attempt.
///
/// Each key can be written once. PreFilter gets `&mut CycleState`; every later stage gets
/// `&CycleState`, so the per-node fan-out only ever reads.
#[derive(Debug, Default)]
pub struct CycleState {
    data: HashMap<String, Box<dyn StateData>>,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write<T: StateData>(&mut self, key: &str, value: T) -> Result<(), CycleStateError> {
        if self.data.contains_key(key) {
            return Err(CycleStateError::AlreadyWritten(key.to_string()));
        }
        self.data.insert(key.to_string(), Box::new(value));
        Ok(())
    }

    pub fn read<T: StateData>(&self, key: &str) -> Result<&T, CycleStateError> {
        let value = self
            .data
            .get(key)
            .ok_or_else(|| CycleStateError::NotFound(key.to_string()))?;
        // go through the trait object, not the Box, so the concrete type is downcast
        <dyn StateData>::as_any(&**value)
            .downcast_ref::<T>()
            .ok_or_else(|| CycleStateError::WrongType(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }
}
