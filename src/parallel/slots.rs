//! Indexed outcome collection written by concurrently running units

use std::sync::Mutex;

use crate::error::{Result, FastConvertError};
use crate::processing::ConversionOutcome;

/// One slot per input file; each unit writes its own slot exactly once
pub struct OutcomeSlots {
    slots: Mutex<Vec<Option<ConversionOutcome>>>,
}

impl OutcomeSlots {
    pub fn new(len: usize) -> Self {
        Self {
            slots: Mutex::new((0..len).map(|_| None).collect()),
        }
    }

    /// Store an outcome at its own index
    pub fn record(&self, outcome: ConversionOutcome) -> Result<()> {
        let index = outcome.index;
        let mut slots = self.slots.lock()
            .map_err(|_| FastConvertError::system("Outcome slots lock poisoned"))?;
        let len = slots.len();

        let slot = slots.get_mut(index).ok_or_else(|| FastConvertError::system(
            format!("Outcome index {} out of range for batch of {}", index, len)
        ))?;

        if slot.is_some() {
            return Err(FastConvertError::system(
                format!("Outcome slot {} written twice", index)
            ));
        }

        *slot = Some(outcome);
        Ok(())
    }

    #[cfg(test)]
    /// Number of slots written so far
    pub fn filled(&self) -> usize {
        self.slots
            .lock()
            .map(|slots| slots.iter().filter(|slot| slot.is_some()).count())
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the outcomes in index order
    pub fn into_outcomes(self) -> Result<Vec<Option<ConversionOutcome>>> {
        self.slots
            .into_inner()
            .map_err(|_| FastConvertError::system("Outcome slots lock poisoned"))
    }
}
