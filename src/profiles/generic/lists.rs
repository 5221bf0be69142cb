//! IPv6 extension-header list decompression (RFC 3095, Section 5.8).
//!
//! A compressed list names items by small slot indices into a per-context
//! item table and publishes the resulting list under an 8-bit generation
//! identifier. The decompressor keeps a sliding window of past generations
//! so that reference-based encodings (insertion, removal, remove-then-insert)
//! can start from any generation still in the window.
//!
//! Generations are immutable once published; decoding an encoding produces a
//! candidate list without touching the tables, and the caller commits the
//! candidate only after the rebuilt headers pass CRC validation.

use std::collections::VecDeque;

use crate::bitstream::BitCursor;
use crate::error::{Field, ParseContext, RohcParsingError};
use crate::types::GenId;

use super::protocol_types::ExtensionItem;

/// Capacity of the per-context item table. XI indices are carried in 3 or
/// 7 bits, so the table must hold more than 7 slots.
pub const LIST_MAX_ITEM: usize = 15;

/// Sliding-window slot: one published generation of the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub gen_id: GenId,
    pub indices: Vec<u8>,
}

/// One XI entry of a list encoding: a slot index plus the X bit saying
/// whether the item body follows in the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XiEntry {
    pub item_present: bool,
    pub index: u8,
}

/// A parsed (not yet applied) list encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEncoding {
    pub encoding_type: u8,
    pub gen_id: Option<GenId>,
    pub ref_id: Option<GenId>,
    pub xi: Vec<XiEntry>,
    /// Positions removed from the reference list (ET 2/3).
    pub removal_mask: Vec<bool>,
    /// Positions of inserted items in the new list (ET 1/3).
    pub insertion_mask: Vec<bool>,
    /// Item bodies, in XI order, for XIs with the X bit set.
    pub items: Vec<ExtensionItem>,
}

/// A decoded candidate list, pending CRC validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedList {
    pub gen_id: Option<GenId>,
    pub indices: Vec<u8>,
    /// Items to place into the table on commit, keyed by slot index.
    pub new_items: Vec<(u8, ExtensionItem)>,
}

/// Per-IP-header list decompressor state.
#[derive(Debug, Clone)]
pub struct ListDecompressor {
    /// Slot table of item bodies (the compression "based table").
    based_table: Vec<Option<ExtensionItem>>,
    /// Translation table: true once the compressor has had the slot
    /// confirmed by a CRC-validated reconstruction.
    known: [bool; LIST_MAX_ITEM],
    /// Published generations, oldest first.
    window: VecDeque<Generation>,
    window_cap: usize,
    /// The currently referenced generation.
    ref_list: Option<Generation>,
}

impl ListDecompressor {
    /// Creates an empty list decompressor with a window of `window_cap`
    /// generations.
    pub fn new(window_cap: usize) -> Self {
        debug_assert!(window_cap >= 2, "list window below protocol minimum");
        Self {
            based_table: vec![None; LIST_MAX_ITEM],
            known: [false; LIST_MAX_ITEM],
            window: VecDeque::new(),
            window_cap,
            ref_list: None,
        }
    }

    /// Indices of the current reference list, if any.
    pub fn ref_indices(&self) -> Option<&[u8]> {
        self.ref_list.as_ref().map(|gen| gen.indices.as_slice())
    }

    /// Looks up a generation still in the window.
    pub fn generation(&self, gen_id: GenId) -> Option<&Generation> {
        self.window.iter().rev().find(|gen| gen.gen_id == gen_id)
    }

    /// True once `index` holds a confirmed item.
    pub fn is_known(&self, index: u8) -> bool {
        self.known[index as usize]
    }

    /// Number of generations currently retained.
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Decodes `encoding` against `reference` into a candidate list.
    ///
    /// `reference` must be the indices of the generation named by
    /// `encoding.ref_id` (resolved by the caller, which maps a failed
    /// lookup to the list-reference-missing error); it is ignored for the
    /// generic scheme (ET 0).
    ///
    /// # Errors
    /// - `RohcParsingError::InvalidListEncoding` - XI without a body naming
    ///   an unpopulated slot, or masks inconsistent with the reference
    pub fn decode(
        &self,
        encoding: &ListEncoding,
        reference: Option<&[u8]>,
    ) -> Result<DecodedList, RohcParsingError> {
        let mut new_items: Vec<(u8, ExtensionItem)> = Vec::new();
        let mut item_iter = encoding.items.iter();

        let mut resolve_xi = |xi: &XiEntry| -> Result<u8, RohcParsingError> {
            if xi.item_present {
                let item = item_iter.next().ok_or(RohcParsingError::InvalidListEncoding {
                    encoding_type: encoding.encoding_type,
                    description: "XI promises an item body the packet does not carry",
                })?;
                new_items.push((xi.index, item.clone()));
            } else {
                let populated = self.based_table[xi.index as usize].is_some()
                    || new_items.iter().any(|(idx, _)| *idx == xi.index);
                if !populated {
                    return Err(RohcParsingError::InvalidListEncoding {
                        encoding_type: encoding.encoding_type,
                        description: "XI references a slot never populated",
                    });
                }
            }
            Ok(xi.index)
        };

        let indices = match encoding.encoding_type {
            0 => {
                let mut indices = Vec::with_capacity(encoding.xi.len());
                for xi in &encoding.xi {
                    indices.push(resolve_xi(xi)?);
                }
                indices
            }
            1 => {
                let reference = reference.unwrap_or_default();
                Self::apply_insertion(
                    reference,
                    &encoding.insertion_mask,
                    &encoding.xi,
                    encoding.encoding_type,
                    &mut resolve_xi,
                )?
            }
            2 => {
                let reference = reference.unwrap_or_default();
                Self::apply_removal(reference, &encoding.removal_mask)
            }
            3 => {
                let reference = reference.unwrap_or_default();
                let trimmed = Self::apply_removal(reference, &encoding.removal_mask);
                Self::apply_insertion(
                    &trimmed,
                    &encoding.insertion_mask,
                    &encoding.xi,
                    encoding.encoding_type,
                    &mut resolve_xi,
                )?
            }
            _ => unreachable!("encoding type is two bits"),
        };

        Ok(DecodedList {
            gen_id: encoding.gen_id,
            indices,
            new_items,
        })
    }

    fn apply_removal(reference: &[u8], mask: &[bool]) -> Vec<u8> {
        reference
            .iter()
            .enumerate()
            .filter(|(pos, _)| !mask.get(*pos).copied().unwrap_or(false))
            .map(|(_, idx)| *idx)
            .collect()
    }

    fn apply_insertion(
        reference: &[u8],
        mask: &[bool],
        xi: &[XiEntry],
        encoding_type: u8,
        resolve_xi: &mut impl FnMut(&XiEntry) -> Result<u8, RohcParsingError>,
    ) -> Result<Vec<u8>, RohcParsingError> {
        let inserted = mask.iter().filter(|bit| **bit).count();
        if inserted != xi.len() {
            return Err(RohcParsingError::InvalidListEncoding {
                encoding_type,
                description: "insertion mask and XI list disagree on item count",
            });
        }
        let mut out = Vec::with_capacity(reference.len() + inserted);
        let mut ref_iter = reference.iter();
        let mut xi_iter = xi.iter();
        for bit in mask {
            if *bit {
                let entry = xi_iter.next().expect("count checked above");
                out.push(resolve_xi(entry)?);
            } else {
                match ref_iter.next() {
                    Some(idx) => out.push(*idx),
                    None => break,
                }
            }
        }
        // Reference items beyond the mask keep their order.
        out.extend(ref_iter.copied());
        Ok(out)
    }

    /// Publishes a CRC-validated candidate: stores new item bodies, marks
    /// their slots known, installs the list as the reference and records
    /// the generation in the window (evicting the oldest when full).
    pub fn commit(&mut self, decoded: &DecodedList) {
        for (index, item) in &decoded.new_items {
            self.based_table[*index as usize] = Some(item.clone());
        }
        for index in &decoded.indices {
            self.known[*index as usize] = true;
        }
        let generation = Generation {
            gen_id: decoded.gen_id.unwrap_or_default(),
            indices: decoded.indices.clone(),
        };
        if let Some(gen_id) = decoded.gen_id {
            self.window.retain(|gen| gen.gen_id != gen_id);
            self.window.push_back(generation.clone());
            while self.window.len() > self.window_cap {
                self.window.pop_front();
            }
        }
        self.ref_list = Some(generation);
    }

    /// Materializes a candidate list into extension-header items, resolving
    /// slots through the table with the candidate's pending items overlaid.
    ///
    /// # Errors
    /// - `RohcParsingError::InvalidListEncoding` - A slot in the list holds no item
    pub fn materialize(&self, decoded: &DecodedList) -> Result<Vec<ExtensionItem>, RohcParsingError> {
        decoded
            .indices
            .iter()
            .map(|index| {
                decoded
                    .new_items
                    .iter()
                    .rev()
                    .find(|(idx, _)| idx == index)
                    .map(|(_, item)| item.clone())
                    .or_else(|| self.based_table[*index as usize].clone())
                    .ok_or(RohcParsingError::InvalidListEncoding {
                        encoding_type: 0,
                        description: "list names an empty item slot",
                    })
            })
            .collect()
    }
}

/// Parses a generic extension-header list encoding at the cursor
/// (RFC 3095, Section 5.8.6.1).
///
/// # Errors
/// - `RohcParsingError::NotEnoughData` - Truncated encoding
/// - `RohcParsingError::InvalidFieldValue` - XI index beyond the item table
pub fn parse_list_encoding(cursor: &mut BitCursor<'_>) -> Result<ListEncoding, RohcParsingError> {
    let first = cursor.read_u8()?;
    let encoding_type = first >> 6;
    let gp = (first & 0x20) != 0;
    let ps = (first & 0x10) != 0;
    let low_nibble = first & 0x0F;

    let mut encoding = ListEncoding {
        encoding_type,
        gen_id: None,
        ref_id: None,
        xi: Vec::new(),
        removal_mask: Vec::new(),
        insertion_mask: Vec::new(),
        items: Vec::new(),
    };

    if gp {
        encoding.gen_id = Some(GenId::new(cursor.read_u8()?));
    }

    match encoding_type {
        0 => {
            let count = low_nibble as usize;
            encoding.xi = parse_xi_list(cursor, count, ps, None)?;
        }
        1 => {
            encoding.ref_id = Some(GenId::new(cursor.read_u8()?));
            encoding.insertion_mask = parse_bit_mask(cursor)?;
            let count = encoding.insertion_mask.iter().filter(|bit| **bit).count();
            let embedded = (!ps).then_some(low_nibble);
            encoding.xi = parse_xi_list(cursor, count, ps, embedded)?;
        }
        2 => {
            encoding.ref_id = Some(GenId::new(cursor.read_u8()?));
            encoding.removal_mask = parse_bit_mask(cursor)?;
        }
        3 => {
            encoding.ref_id = Some(GenId::new(cursor.read_u8()?));
            encoding.removal_mask = parse_bit_mask(cursor)?;
            encoding.insertion_mask = parse_bit_mask(cursor)?;
            let count = encoding.insertion_mask.iter().filter(|bit| **bit).count();
            let embedded = (!ps).then_some(low_nibble);
            encoding.xi = parse_xi_list(cursor, count, ps, embedded)?;
        }
        _ => unreachable!("encoding type is two bits"),
    }

    // Item bodies trail the XI list for every XI with the X bit set.
    for xi in encoding.xi.clone() {
        if !xi.item_present {
            continue;
        }
        let header_type = cursor.peek_bits(8)? as u8;
        let len_byte = {
            let mut probe = cursor.clone();
            probe.skip_bits(8)?;
            probe.read_u8()?
        };
        let total_len = match header_type {
            crate::constants::IP_PROTOCOL_AH => (len_byte as usize + 2) * 4,
            _ => (len_byte as usize + 1) * 8,
        };
        let raw = cursor.read_bytes(total_len)?;
        encoding.items.push(ExtensionItem::parse(header_type, raw)?);
    }

    Ok(encoding)
}

/// Parses a 7- or 15-bit positional mask; the MSB of the first octet
/// selects the two-octet form.
fn parse_bit_mask(cursor: &mut BitCursor<'_>) -> Result<Vec<bool>, RohcParsingError> {
    let first = cursor.read_u8()?;
    let mut mask = Vec::with_capacity(15);
    for bit in (0..7).rev() {
        mask.push((first >> bit) & 1 == 1);
    }
    if first & 0x80 != 0 {
        let second = cursor.read_u8()?;
        for bit in (0..8).rev() {
            mask.push((second >> bit) & 1 == 1);
        }
    }
    Ok(mask)
}

/// Parses `count` XI entries. With 4-bit XIs (`ps` false) the first entry
/// may live in the low nibble of the encoding's first octet (`embedded`),
/// and the rest are packed two per byte, high nibble first.
fn parse_xi_list(
    cursor: &mut BitCursor<'_>,
    count: usize,
    ps: bool,
    embedded: Option<u8>,
) -> Result<Vec<XiEntry>, RohcParsingError> {
    let mut entries = Vec::with_capacity(count);
    let mut push = |nibble_or_byte: u8, wide: bool| -> Result<(), RohcParsingError> {
        let (present, index) = if wide {
            ((nibble_or_byte & 0x80) != 0, nibble_or_byte & 0x7F)
        } else {
            ((nibble_or_byte & 0x08) != 0, nibble_or_byte & 0x07)
        };
        if index as usize >= LIST_MAX_ITEM {
            return Err(RohcParsingError::InvalidFieldValue {
                field: Field::XiIndex,
                context: ParseContext::ListEncoding,
                expected: LIST_MAX_ITEM as u32 - 1,
                got: index as u32,
            });
        }
        entries.push(XiEntry {
            item_present: present,
            index,
        });
        Ok(())
    };

    if ps {
        for _ in 0..count {
            let byte = cursor.read_u8()?;
            push(byte, true)?;
        }
        return Ok(entries);
    }

    let mut remaining = count;
    if let Some(nibble) = embedded {
        if remaining > 0 {
            push(nibble, false)?;
            remaining -= 1;
        }
    }
    let mut pending = remaining;
    while pending > 0 {
        let byte = cursor.read_u8()?;
        push(byte >> 4, false)?;
        pending -= 1;
        if pending > 0 {
            push(byte & 0x0F, false)?;
            pending -= 1;
        }
    }
    Ok(entries)
}

/// Total byte length of a list encoding starting at `data`, without
/// interpreting it (used to skip lists inside chains).
pub fn list_encoding_len(data: &[u8]) -> Result<usize, RohcParsingError> {
    let mut cursor = BitCursor::new(data);
    parse_list_encoding(&mut cursor)?;
    Ok(cursor.consumed_bytes())
}
