//! Channel selection by per-type ordinal.
//!
//! Auxiliary and bipolar channels are selected by their position within their own
//! type group (the first bipolar channel is ordinal 0 whatever its raw index).
//! Every other channel type is switched off.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::device::{ChannelType, Device};
use crate::error::DeviceError;

/// Auxiliary and bipolar ordinals that stay enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSelection {
    pub aux: BTreeSet<usize>,
    pub bip: BTreeSet<usize>,
}

impl Default for ChannelSelection {
    /// A single ECG lead on the first bipolar input.
    fn default() -> Self {
        Self {
            aux: BTreeSet::new(),
            bip: BTreeSet::from([0]),
        }
    }
}

impl ChannelSelection {
    pub fn new<A, B>(aux: A, bip: B) -> Self
    where
        A: IntoIterator<Item = usize>,
        B: IntoIterator<Item = usize>,
    {
        Self {
            aux: aux.into_iter().collect(),
            bip: bip.into_iter().collect(),
        }
    }
}

/// Raw channel indices to switch on and off. Disjoint, and together cover every channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelPartition {
    pub enable: Vec<usize>,
    pub disable: Vec<usize>,
}

impl ChannelPartition {
    pub fn len(&self) -> usize {
        self.enable.len() + self.disable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split `channels` (type tags in device order) into enable and disable sets.
pub fn partition(channels: &[ChannelType], selection: &ChannelSelection) -> ChannelPartition {
    let mut aux_count = 0;
    let mut bip_count = 0;
    let mut result = ChannelPartition::default();
    for (index, &channel_type) in channels.iter().enumerate() {
        let keep = match channel_type {
            ChannelType::Aux => {
                let keep = selection.aux.contains(&aux_count);
                aux_count += 1;
                keep
            }
            ChannelType::Bip => {
                let keep = selection.bip.contains(&bip_count);
                bip_count += 1;
                keep
            }
            _ => false,
        };
        if keep {
            result.enable.push(index);
        } else {
            result.disable.push(index);
        }
    }
    result
}

/// Push a partition to the device: enable pass first, then disable pass.
pub fn apply(device: &mut dyn Device, partition: &ChannelPartition) -> Result<(), DeviceError> {
    log::debug!(
        "enabling {:?}, disabling {} channels",
        partition.enable,
        partition.disable.len()
    );
    device.set_active_channels(&partition.enable, true)?;
    device.set_active_channels(&partition.disable, false)?;
    Ok(())
}

/// Read the channel list from `device`, partition it and apply the result.
pub fn select(device: &mut dyn Device, selection: &ChannelSelection) -> Result<ChannelPartition, DeviceError> {
    let types: Vec<ChannelType> = device
        .channels()?
        .iter()
        .map(|ch| ch.channel_type)
        .collect();
    let partition = partition(&types, selection);
    apply(device, &partition)?;
    Ok(partition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ChannelType::*;

    #[test]
    fn test_mixed_layout() {
        let channels = [Uni, Bip, Aux, Bip, Aux, Aux, Counter];
        let selection = ChannelSelection::new([1, 2], [1]);
        let result = partition(&channels, &selection);
        assert_eq!(result.enable, vec![3, 4, 5]);
        assert_eq!(result.disable, vec![0, 1, 2, 6]);
    }

    #[test]
    fn test_ordinals_out_of_range_are_ignored() {
        let channels = [Bip, Bip];
        let selection = ChannelSelection::new([0], [5]);
        let result = partition(&channels, &selection);
        assert!(result.enable.is_empty());
        assert_eq!(result.disable, vec![0, 1]);
    }

    #[test]
    fn test_empty_channel_list() {
        let result = partition(&[], &ChannelSelection::default());
        assert!(result.is_empty());
    }

    #[test]
    fn test_default_selection_is_first_bipolar() {
        let selection = ChannelSelection::default();
        assert!(selection.aux.is_empty());
        assert_eq!(selection.bip.iter().copied().collect::<Vec<_>>(), vec![0]);
    }
}
