use sfs_types::{read_le_u32, write_le_u32, ParseError, BLOCK_SIZE, POINTERS_PER_BLOCK};

/// Decode an indirect block into its 1024 pointer entries.
///
/// A zero entry means the corresponding file block is unallocated.
pub fn decode_pointer_block(block: &[u8]) -> Result<Vec<u32>, ParseError> {
    let mut pointers = Vec::with_capacity(POINTERS_PER_BLOCK);
    for i in 0..POINTERS_PER_BLOCK {
        pointers.push(read_le_u32(block, i * 4)?);
    }
    Ok(pointers)
}

/// Encode pointer entries into a full indirect block buffer.
///
/// `pointers` must hold exactly `POINTERS_PER_BLOCK` entries.
pub fn encode_pointer_block(pointers: &[u32]) -> Result<Vec<u8>, ParseError> {
    if pointers.len() != POINTERS_PER_BLOCK {
        return Err(ParseError::InvalidField {
            field: "pointers",
            reason: "must hold exactly 1024 entries",
        });
    }
    let mut block = vec![0_u8; BLOCK_SIZE];
    for (i, pointer) in pointers.iter().enumerate() {
        write_le_u32(&mut block, i * 4, *pointer)?;
    }
    Ok(block)
}
