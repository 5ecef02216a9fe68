//! Ext4 extent-tree layout (`ext4_extents.h`). `Inode::i_block`'s 60 bytes
//! are reinterpreted as one [`ExtentHeader`] followed by up to 4
//! [`Extent`]/[`ExtentIdx`] entries when `IFlags::has_extents` is set.

use serde::{Deserialize, Serialize};

/// `EXT4_EXT_MAGIC`.
pub const EXTENT_MAGIC: u16 = 0xF30A;

// Source: https://elixir.bootlin.com/linux/latest/source/fs/ext4/ext4_extents.h
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Extent {
    pub ee_block: u32,    // first logical block extent covers
    pub ee_len: u16,      // number of blocks covered by extent
    pub ee_start_hi: u16, // high 16 bits of physical block
    pub ee_start_lo: u32, // low 32 bits of physical block
}

impl Extent {
    pub fn physical_start(&self) -> u64
    {
        crate::hilo!(self.ee_start_hi, self.ee_start_lo)
    }
}

// https://elixir.bootlin.com/linux/latest/source/fs/ext4/ext4_extents.h
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtentHeader {
    pub eh_magic: u16,      // probably will support different formats
    pub eh_entries: u16,    // number of valid entries
    pub eh_max: u16,        // capacity of store in entries
    pub eh_depth: u16,      // has tree real underlying blocks?
    pub eh_generation: u32, // generation of the tree
}

impl ExtentHeader {
    pub fn is_valid(&self) -> bool
    {
        self.eh_magic == EXTENT_MAGIC
    }
}

// https://elixir.bootlin.com/linux/latest/source/fs/ext4/ext4_extents.h
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtentIdx {
    pub ei_block: u32,   // index covers logical blocks from 'block'
    pub ei_leaf_lo: u32, // pointer to the physical block of the next
                         // level. leaf or next index could be there
    pub ei_leaf_hi: u16, // high 16 bits of physical block
    pub ei_unused: u16,
}

impl ExtentIdx {
    pub fn leaf_block(&self) -> u64
    {
        crate::hilo!(self.ei_leaf_hi, self.ei_leaf_lo)
    }
}

// https://elixir.bootlin.com/linux/latest/source/fs/ext4/ext4_extents.h
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtentTail {
    pub et_checksum: u32, // crc32c(uuid+inum+extent_block)
}

pub const EXTENT_HEADER_SIZE: usize = 12;
pub const EXTENT_ENTRY_SIZE: usize = 12;

/// Decodes the 60-byte `i_block` area of an extent-flagged inode into a
/// header plus its direct entries (depth-0 leaves as [`Extent`], depth>0
/// as [`ExtentIdx`]). Does not recurse into child blocks; the caller walks
/// those by reading further blocks from the underlying image.
pub fn parse_root(i_block: &[u32; 15]) -> anyhow::Result<(ExtentHeader, Vec<Extent>, Vec<ExtentIdx>)>
{
    use bincode::{DefaultOptions, Options};

    let mut raw = [0u8; 60];
    for (i, word) in i_block.iter().enumerate() {
        raw[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
    }

    let opt = DefaultOptions::new().with_fixint_encoding().allow_trailing_bytes();
    let header: ExtentHeader = opt.deserialize(&raw[..EXTENT_HEADER_SIZE])?;

    if !header.is_valid() {
        anyhow::bail!("bad extent header magic: {:#06x}", header.eh_magic);
    }

    let entries = header.eh_entries.min(4) as usize;
    let mut leaves = Vec::new();
    let mut idxs = Vec::new();

    for i in 0..entries {
        let start = EXTENT_HEADER_SIZE + i * EXTENT_ENTRY_SIZE;
        let slice = &raw[start..start + EXTENT_ENTRY_SIZE];
        if header.eh_depth == 0 {
            leaves.push(opt.deserialize::<Extent>(slice)?);
        } else {
            idxs.push(opt.deserialize::<ExtentIdx>(slice)?);
        }
    }

    Ok((header, leaves, idxs))
}
