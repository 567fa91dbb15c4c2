//! How remote objects are laid out, as far as the inspector needs to know.

use crate::util::Address;

/// A word of the object header a watchpoint can be set on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum HeaderField {
    /// The pointer to the object's type information.
    Hub,
    /// The word that holds the forwarding pointer and GC bits.
    Misc,
    /// The length of an array.
    Length,
}

/// A named field of a remote object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub offset: usize,
    pub size: usize,
}

impl FieldDescriptor {
    pub fn new(name: &str, offset: usize, size: usize) -> Self {
        FieldDescriptor {
            name: name.to_string(),
            offset,
            size,
        }
    }
}

/// Offsets into a remote object, relative to its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLayout {
    pub word_size: usize,
    /// The word the collector writes `new | FORWARDED` into.
    pub forwarding_offset: usize,
    pub misc_offset: usize,
    pub hub_offset: usize,
    pub length_offset: usize,
    /// The word holding the object size in bytes.
    pub size_offset: usize,
    /// The first array element.
    pub elements_offset: usize,
}

impl ObjectLayout {
    pub fn header_offset(&self, field: HeaderField) -> usize {
        match field {
            HeaderField::Hub => self.hub_offset,
            HeaderField::Misc => self.misc_offset,
            HeaderField::Length => self.length_offset,
        }
    }

    pub fn array_element_offset(&self, element_size: usize, index: usize) -> usize {
        self.elements_offset + element_size * index
    }

    pub fn forwarding_word_address(&self, origin: Address) -> Address {
        origin + self.forwarding_offset
    }
}
