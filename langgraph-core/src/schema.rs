//! A schema declares the finite set of channels a graph reads and
//! writes (`spec.md` §3).

use std::collections::BTreeMap;

use crate::channel::ChannelSpec;
use crate::error::{Result, RuntimeError};

/// The finite channel set a compiled graph operates over.
#[derive(Default)]
pub struct Schema {
    channels: BTreeMap<String, ChannelSpec>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn get(&self, channel_id: &str) -> Result<&ChannelSpec> {
        self.channels
            .get(channel_id)
            .ok_or_else(|| RuntimeError::UnknownChannel(channel_id.to_string()))
    }

    pub fn contains(&self, channel_id: &str) -> bool {
        self.channels.contains_key(channel_id)
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChannelSpec)> {
        self.channels.iter().map(|(id, spec)| (id.as_str(), spec))
    }
}

/// Builds a [`Schema`] from channel descriptors.
#[derive(Default)]
pub struct SchemaBuilder {
    channels: BTreeMap<String, ChannelSpec>,
}

impl SchemaBuilder {
    pub fn channel(mut self, spec: ChannelSpec) -> Self {
        self.channels.insert(spec.id.clone(), spec);
        self
    }

    pub fn build(self) -> Schema {
        Schema {
            channels: self.channels,
        }
    }
}
