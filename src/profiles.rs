//! Naming conventions for versioned and segmented streams.
//!
//! Both markers are followed by a fixed-width big-endian number, so the byte
//! order of components is also their numeric order and the child selectors
//! rank segments and versions correctly.

use alloc::vec::Vec;

use crate::{
    clock::Timestamp,
    name::{Name, NameComponent},
};

pub const SEGMENT_MARKER: u8 = 0x00;
pub const VERSION_MARKER: u8 = 0xFD;

pub fn segment_component(segment: u64) -> NameComponent {
    marked_component(SEGMENT_MARKER, segment)
}

pub fn segment_name(base: &Name, segment: u64) -> Name {
    base.adding_component(segment_component(segment))
}

pub fn segment_from_component(component: &NameComponent) -> Option<u64> {
    number_from_component(SEGMENT_MARKER, component)
}

/// The segment number carried by the last component, if it is a segment.
pub fn segment_number(name: &Name) -> Option<u64> {
    name.last_component().and_then(segment_from_component)
}

/// The stream a segment name belongs to.
pub fn stream_of(name: &Name) -> Option<Name> {
    segment_number(name)?;
    name.dropping_last_component()
}

/// Splits a segment name into the stream it belongs to and its number.
pub fn split_segment(name: &Name) -> Option<(Name, u64)> {
    Some((stream_of(name)?, segment_number(name)?))
}

pub fn version_component(version: Timestamp) -> NameComponent {
    marked_component(VERSION_MARKER, version.ms_since_1970)
}

pub fn add_version(name: &Name, version: Timestamp) -> Name {
    name.adding_component(version_component(version))
}

/// The innermost version stamped into `name`.
pub fn version_of(name: &Name) -> Option<Timestamp> {
    name.components()
        .rev()
        .find_map(|c| number_from_component(VERSION_MARKER, c))
        .map(|ms_since_1970| Timestamp { ms_since_1970 })
}

fn marked_component(marker: u8, number: u64) -> NameComponent {
    let mut bytes = Vec::with_capacity(9);
    bytes.push(marker);
    bytes.extend_from_slice(&number.to_be_bytes());
    NameComponent::from(bytes)
}

fn number_from_component(marker: u8, component: &NameComponent) -> Option<u64> {
    match component.bytes() {
        [m, rest @ ..] if *m == marker => Some(u64::from_be_bytes(rest.try_into().ok()?)),
        _ => None,
    }
}
