//! The forwarding word of an object.
//!
//! Every object reserves one word for the collector, at
//! [`crate::vm::ObjectModel::FORWARDING_POINTER_OFFSET`] from its origin. Outside a
//! collection the word is zero. During a collection the two low bits are tags:
//! [`FORWARDED_BIT`] says the rest of the word is the address of the new copy, and
//! [`MARK_BIT`] says the object was reached by the marking phase of a compaction.
//!
//! The encoding is shared with the inspector, which reads forwarding words from a
//! remote process through [`is_forwarded_word`] and [`forwarding_pointer_of_word`].

use crate::util::{Address, ObjectReference};
use crate::vm::ObjectModel;
use crate::vm::VMBinding;

/// The object has been copied, and the word holds the address of the copy.
pub const FORWARDED_BIT: usize = 0b01;
/// The object has been marked live by the compaction.
pub const MARK_BIT: usize = 0b10;
const TAG_MASK: usize = FORWARDED_BIT | MARK_BIT;

const_assert!(crate::util::constants::BYTES_IN_WORD > TAG_MASK);

/// Does this forwarding word hold a forwarding pointer?
pub fn is_forwarded_word(word: usize) -> bool {
    word & FORWARDED_BIT != 0
}

/// The forwarding pointer held in a forwarding word.
pub fn forwarding_pointer_of_word(word: usize) -> Address {
    unsafe { Address::from_usize(word & !TAG_MASK) }
}

/// The address of the forwarding word of an object.
pub fn forwarding_word_address<VM: VMBinding>(object: ObjectReference) -> Address {
    object.to_raw_address() + VM::VMObjectModel::FORWARDING_POINTER_OFFSET
}

pub fn read_forwarding_word<VM: VMBinding>(object: ObjectReference) -> usize {
    unsafe { forwarding_word_address::<VM>(object).load::<usize>() }
}

fn write_forwarding_word<VM: VMBinding>(object: ObjectReference, word: usize) {
    unsafe { forwarding_word_address::<VM>(object).store::<usize>(word) }
}

pub fn is_forwarded<VM: VMBinding>(object: ObjectReference) -> bool {
    is_forwarded_word(read_forwarding_word::<VM>(object))
}

/// Read the forwarding pointer of a forwarded object.
pub fn read_forwarding_pointer<VM: VMBinding>(object: ObjectReference) -> ObjectReference {
    let word = read_forwarding_word::<VM>(object);
    debug_assert!(
        is_forwarded_word(word),
        "Object {} is not forwarded (word {:#x})",
        object,
        word
    );
    ObjectReference::from_raw_address(forwarding_pointer_of_word(word))
}

/// Install a forwarding pointer to `new_object`. The mark bit is preserved.
pub fn write_forwarding_pointer<VM: VMBinding>(object: ObjectReference, new_object: ObjectReference) {
    debug_assert!(new_object.to_raw_address().is_aligned_to(TAG_MASK + 1));
    let mark = read_forwarding_word::<VM>(object) & MARK_BIT;
    trace!("Forwarding {} to {}", object, new_object);
    write_forwarding_word::<VM>(object, new_object.value() | FORWARDED_BIT | mark);
}

/// Return the object a reference now stands for: the copy if the object was forwarded.
pub fn get_forwarded_object<VM: VMBinding>(object: ObjectReference) -> ObjectReference {
    if is_forwarded::<VM>(object) {
        read_forwarding_pointer::<VM>(object)
    } else {
        object
    }
}

pub fn is_marked<VM: VMBinding>(object: ObjectReference) -> bool {
    read_forwarding_word::<VM>(object) & MARK_BIT != 0
}

/// Set the mark bit. Returns true if this call marked the object.
pub fn test_and_mark<VM: VMBinding>(object: ObjectReference) -> bool {
    let word = read_forwarding_word::<VM>(object);
    if word & MARK_BIT != 0 {
        false
    } else {
        write_forwarding_word::<VM>(object, word | MARK_BIT);
        true
    }
}

/// Reset the forwarding word to its mutator state.
pub fn clear_forwarding_bits<VM: VMBinding>(object: ObjectReference) {
    write_forwarding_word::<VM>(object, 0);
}
