//! Ext2/3/4 editor: reads the superblock and group-descriptor table
//! built by `filesys::e2fs`, and implements the `ext2 -- inode <N> <path>`
//! subcommand (spec sec. 5, S5) that decodes one inode's extent tree.

use std::path::Path;

use anyhow::{anyhow, bail, Context as _};
use bincode::{DefaultOptions, Options};

use crate::bs;
use crate::context::Context;
use crate::editor::{Editor, EditorState};
use crate::error::ImgError;
use crate::filesys::e2fs::extent::{Extent, ExtentHeader, ExtentIdx, EXTENT_ENTRY_SIZE, EXTENT_HEADER_SIZE, EXTENT_MAGIC};
use crate::filesys::e2fs::inode::{IFlags, Inode, InodeType, GOOD_OLD_INODE_SIZE, INODE_STRUCT_SIZE};
use crate::filesys::e2fs::{
    fetch_regular_bg_descriptor, get_and_check_fs_options, start_of_first_gdt, Fs, GroupDescriptor, Revision, SuperBlock,
    GROUP_DESC_STRUCT_SIZE,
};
use crate::hilo;
use crate::vfs::VfHandle;

const SUPERBLOCK_OFFSET: u64 = 1024;
const SUPERBLOCK_SIZE: usize = 1024;
const EXT2_MAGIC: u16 = 0xEF53;
const EXT2_JOURNAL_INO: u64 = 8;

/// `ext4_extent_header.eh_depth` is a 16-bit field, but no real filesystem
/// nests extent trees more than a few levels deep; beyond this the value
/// itself is treated as corrupt rather than merely deep.
const EXTENT_MAX_DEPTH: u16 = 5;

/// Independent backstop against a corrupted index chain that cycles or
/// otherwise refuses to bottom out: aborts the walk rather than recursing
/// until the stack overflows.
const EXTENT_MAX_RECURSION: u32 = 32;

fn bincode_opts() -> impl Options
{
    DefaultOptions::new().with_fixint_encoding().allow_trailing_bytes()
}

fn read_superblock(ctx: &mut Context, handle: VfHandle) -> anyhow::Result<SuperBlock>
{
    ctx.vfs.fileseek(handle, SUPERBLOCK_OFFSET)?;
    let mut buf = vec![0u8; SUPERBLOCK_SIZE];
    let n = ctx.vfs.fileread(handle, &mut buf)?;
    if n != buf.len() {
        return Err(ImgError::Truncated { needed: buf.len() as u64, have: n as u64 }.into());
    }
    Ok(bincode_opts().deserialize(&buf)?)
}

/// Computes the derived layout fields the original keeps alongside the raw
/// superblock (block/group size, descriptor stride, checksum seed), then
/// reads the group-descriptor table into a padded buffer so every slot can
/// be decoded as a full 64-byte [`GroupDescriptor`] regardless of the
/// on-disk descriptor size.
fn build_fs(ctx: &mut Context, handle: VfHandle, sb: SuperBlock) -> anyhow::Result<Fs>
{
    let opts = get_and_check_fs_options(&sb, false, false)?;
    let dyn_cfg = opts.dyn_cfg;

    let block_size = bs!(sb.s_log_block_size);
    let has_64bit = dyn_cfg.map(|c| c.incompat.has_64bit()).unwrap_or(false);

    let blocks_count = if has_64bit {
        hilo!(sb.s_blocks_count_hi, sb.s_blocks_count_lo)
    } else {
        sb.s_blocks_count_lo as u64
    };
    let bg_count = blocks_count.div_ceil(sb.s_blocks_per_group as u64).max(1);

    let on_disk_desc_size = if has_64bit && sb.s_desc_size > 0 { sb.s_desc_size as u64 } else { 32 };
    let desc_stride = on_disk_desc_size.max(GROUP_DESC_STRUCT_SIZE as u64);

    let inode_size = match opts.revision {
        Revision::Dynamic if sb.s_inode_size > 0 => sb.s_inode_size as u64,
        _ => GOOD_OLD_INODE_SIZE as u64,
    };

    let csum_seed = dyn_cfg.and_then(|c| {
        if !c.ro_compat.has_metadata_csum() {
            None
        } else if c.incompat.has_csum_seed() {
            Some(sb.s_checksum_seed)
        } else {
            Some(crate::primitives::crc::crc32c(&sb.s_uuid))
        }
    });

    let gdt_start = start_of_first_gdt(&sb);
    let mut desc_table = vec![0u8; (bg_count * desc_stride) as usize];

    for bg in 0..bg_count {
        ctx.vfs.fileseek(handle, gdt_start + bg * on_disk_desc_size)?;
        let dst = &mut desc_table[(bg * desc_stride) as usize..(bg * desc_stride + on_disk_desc_size) as usize];
        let n = ctx.vfs.fileread(handle, dst)?;
        if n != dst.len() {
            return Err(ImgError::Truncated { needed: dst.len() as u64, have: n as u64 }.into());
        }
    }

    Ok(Fs { sb, desc_table, opts, bg_count, bg_size: sb.s_blocks_per_group as u64 * block_size, desc_size: desc_stride, inode_size, csum_seed })
}

fn read_inode(ctx: &mut Context, handle: VfHandle, fs: &Fs, inode_num: u64) -> anyhow::Result<Inode>
{
    if inode_num == 0 {
        bail!("inode numbers are 1-based");
    }

    let bg = (inode_num - 1) / fs.sb.s_inodes_per_group as u64;
    let index_in_group = (inode_num - 1) % fs.sb.s_inodes_per_group as u64;

    let desc: GroupDescriptor = fetch_regular_bg_descriptor(bg, fs)?;
    let block_size = bs!(fs.sb.s_log_block_size);
    let inode_table_start = hilo!(desc.bg_inode_table_hi, desc.bg_inode_table_lo) * block_size;
    let offset = inode_table_start + index_in_group * fs.inode_size;

    ctx.vfs.fileseek(handle, offset)?;
    let mut raw = vec![0u8; fs.inode_size as usize];
    let n = ctx.vfs.fileread(handle, &mut raw)?;
    if n != raw.len() {
        return Err(ImgError::Truncated { needed: raw.len() as u64, have: n as u64 }.into());
    }

    let mut padded = vec![0u8; INODE_STRUCT_SIZE.max(fs.inode_size as usize)];
    let n = raw.len().min(padded.len());
    padded[..n].copy_from_slice(&raw[..n]);

    Ok(bincode_opts().deserialize(&padded)?)
}

fn parse_extent_block(buf: &[u8]) -> anyhow::Result<(ExtentHeader, Vec<Extent>, Vec<ExtentIdx>)>
{
    if buf.len() < EXTENT_HEADER_SIZE {
        return Err(ImgError::Truncated { needed: EXTENT_HEADER_SIZE as u64, have: buf.len() as u64 }.into());
    }

    let opt = bincode_opts();
    let header: ExtentHeader = opt.deserialize(&buf[..EXTENT_HEADER_SIZE])?;

    if header.eh_magic != EXTENT_MAGIC {
        bail!("bad extent header magic: {:#06x}", header.eh_magic);
    }
    if header.eh_depth > EXTENT_MAX_DEPTH {
        return Err(ImgError::InvalidField {
            field: "eh_depth".to_string(),
            detail: format!("{} exceeds the maximum of {EXTENT_MAX_DEPTH}", header.eh_depth),
        }
        .into());
    }

    let entries = header.eh_entries as usize;
    let needed = EXTENT_HEADER_SIZE + entries * EXTENT_ENTRY_SIZE;
    if needed > buf.len() {
        return Err(ImgError::Truncated { needed: needed as u64, have: buf.len() as u64 }.into());
    }

    let mut leaves = Vec::new();
    let mut idxs = Vec::new();

    for i in 0..entries {
        let start = EXTENT_HEADER_SIZE + i * EXTENT_ENTRY_SIZE;
        let slice = &buf[start..start + EXTENT_ENTRY_SIZE];
        if header.eh_depth == 0 {
            leaves.push(opt.deserialize::<Extent>(slice)?);
        } else {
            idxs.push(opt.deserialize::<ExtentIdx>(slice)?);
        }
    }

    Ok((header, leaves, idxs))
}

fn print_extent_tree(
    ctx: &mut Context,
    handle: VfHandle,
    fs: &Fs,
    header: ExtentHeader,
    leaves: &[Extent],
    idxs: &[ExtentIdx],
    depth: u32,
) -> anyhow::Result<()>
{
    if depth > EXTENT_MAX_RECURSION {
        return Err(ImgError::FormatLimit(format!("extent tree recursion depth {depth} exceeds {EXTENT_MAX_RECURSION}")).into());
    }

    println!("extent header: magic={:#06x} entries={} max={} depth={}", header.eh_magic, header.eh_entries, header.eh_max, header.eh_depth);

    for leaf in leaves {
        println!(
            "  extent: logical_block={} len={} physical_start={}",
            leaf.ee_block,
            leaf.ee_len,
            leaf.physical_start()
        );
    }

    let block_size = bs!(fs.sb.s_log_block_size);
    for idx in idxs {
        println!("  index: logical_block={} -> leaf_block={}", idx.ei_block, idx.leaf_block());

        ctx.vfs.fileseek(handle, idx.leaf_block() * block_size)?;
        let mut buf = vec![0u8; block_size as usize];
        ctx.vfs.fileread(handle, &mut buf)?;

        let (child_hdr, child_leaves, child_idxs) = parse_extent_block(&buf)?;
        print_extent_tree(ctx, handle, fs, child_hdr, &child_leaves, &child_idxs, depth + 1)?;
    }

    Ok(())
}

#[derive(Default)]
struct Ext234State {
    fs: Option<Fs>,
}

pub struct Ext234Editor;

impl Editor for Ext234Editor {
    fn name(&self) -> &'static str
    {
        "ext2"
    }

    fn descriptor(&self) -> &'static str
    {
        "ext2/3/4 filesystem editor"
    }

    fn header_size(&self) -> usize
    {
        (SUPERBLOCK_OFFSET as usize) + SUPERBLOCK_SIZE
    }

    fn search_magic(&self) -> Option<crate::editor::SearchMagic>
    {
        // s_magic sits 56 bytes into the superblock, which itself starts at
        // byte 1024 (0x438 absolute, the standard ext2 magic location).
        Some(crate::editor::SearchMagic { pattern: &[0x53, 0xEF], offset_in_header: 1024 + 56 })
    }

    fn init(&self, _ctx: &mut Context) -> EditorState
    {
        Box::new(Ext234State::default())
    }

    fn detect(&self, state: &mut EditorState, ctx: &mut Context, handle: VfHandle, force_type: bool) -> anyhow::Result<()>
    {
        let sb = read_superblock(ctx, handle)?;

        if sb.s_magic != EXT2_MAGIC {
            ctx.diagnose(force_type, "magic doesn't match");
            return Err(ImgError::BadMagic { expected: format!("{EXT2_MAGIC:#06x}"), actual: format!("{:#06x}", sb.s_magic) }.into());
        }

        let fs = build_fs(ctx, handle, sb).map_err(|e| {
            ctx.diagnose(force_type, &format!("{e:#}"));
            e
        })?;

        state.downcast_mut::<Ext234State>().expect("ext234 state").fs = Some(fs);
        Ok(())
    }

    fn total_size(&self, state: &EditorState, _ctx: &Context) -> Option<u64>
    {
        let fs = state.downcast_ref::<Ext234State>().expect("ext234 state").fs.as_ref()?;
        let block_size = bs!(fs.sb.s_log_block_size);
        Some(fs.bg_count * fs.sb.s_blocks_per_group as u64 * block_size)
    }

    fn list(&self, state: &mut EditorState, _ctx: &mut Context, _handle: VfHandle, _args: &[String]) -> anyhow::Result<()>
    {
        let fs = state.downcast_ref::<Ext234State>().expect("ext234 state").fs.as_ref().ok_or_else(|| anyhow!("not detected"))?;
        let sb = &fs.sb;

        println!("block size:       {}", bs!(sb.s_log_block_size));
        println!("blocks count:     {}", hilo!(sb.s_blocks_count_hi, sb.s_blocks_count_lo));
        println!("free blocks:      {}", hilo!(sb.s_free_blocks_count_hi, sb.s_free_blocks_count_lo));
        println!("inodes count:     {}", sb.s_inodes_count);
        println!("free inodes:      {}", sb.s_free_inodes_count);
        println!("inodes per group: {}", sb.s_inodes_per_group);
        println!("inode size:       {}", fs.inode_size);
        println!("block groups:     {}", fs.bg_count);
        println!("volume name:      {}", String::from_utf8_lossy(&sb.s_volume_name).trim_end_matches('\0'));
        println!("uuid:             {}", crate::primitives::hash::hex(&sb.s_uuid));

        Ok(())
    }

    /// `ext2 -- inode <N> <path>`: decodes one inode (root directory being
    /// the canonical example, inode 2) and walks its extent tree.
    fn main(&self, _state: &mut EditorState, ctx: &mut Context, args: &[String]) -> anyhow::Result<()>
    {
        if args.first().map(String::as_str) != Some("inode") {
            bail!("ext2: unknown subcommand (expected `inode <N> <path>`)");
        }

        let inode_num: u64 = args.get(1).ok_or_else(|| anyhow!("missing inode number"))?.parse().with_context(|| "parsing inode number")?;
        let path = args.get(2).ok_or_else(|| anyhow!("missing image path"))?;

        let handle = ctx.vfs.open(Path::new(path), 0)?;
        let sb = read_superblock(ctx, handle)?;
        if sb.s_magic != EXT2_MAGIC {
            ctx.vfs.close(handle);
            return Err(ImgError::BadMagic { expected: format!("{EXT2_MAGIC:#06x}"), actual: format!("{:#06x}", sb.s_magic) }.into());
        }
        let fs = build_fs(ctx, handle, sb)?;

        let inode = read_inode(ctx, handle, &fs, inode_num)?;
        let i_flags = IFlags(inode.i_flags);
        let kind = InodeType::classify(inode.i_mode, inode_num == EXT2_JOURNAL_INO, &i_flags);

        println!("inode {inode_num}:");
        println!("  type:         {kind:?}");
        println!("  mode:         {:#06o}", inode.i_mode);
        println!("  size:         {}", hilo!(inode.i_size_high, inode.i_size_lo));
        println!("  links count:  {}", inode.i_links_count);
        println!("  flags:        {:#010x}", inode.i_flags);

        if i_flags.has_extents() {
            let mut raw = [0u8; 60];
            for (i, word) in inode.i_block.iter().enumerate() {
                raw[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
            }
            let (header, leaves, idxs) = parse_extent_block(&raw)?;
            print_extent_tree(ctx, handle, &fs, header, &leaves, &idxs, 0)?;
        }

        ctx.vfs.close(handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sb_bytes(inodes_per_group: u32, blocks_per_group: u32, blocks_count: u32, log_block_size: u32) -> Vec<u8>
    {
        let mut sb = SuperBlock {
            s_inodes_count: inodes_per_group,
            s_blocks_count_lo: blocks_count,
            s_log_block_size: log_block_size,
            s_blocks_per_group: blocks_per_group,
            s_inodes_per_group: inodes_per_group,
            s_magic: EXT2_MAGIC,
            s_state: 0x1,
            s_errors: 1,
            s_creator_os: 0,
            s_rev_level: 1,
            s_first_ino: 11,
            s_inode_size: 256,
            s_desc_size: 0,
            ..Default::default()
        };
        sb.s_feature_compat = 0;
        sb.s_feature_incompat = 0;
        sb.s_feature_ro_compat = 0;
        bincode_opts().serialize(&sb).unwrap()
    }

    #[test]
    fn detect_rejects_bad_magic()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fs.img");
        std::fs::write(&path, vec![0u8; 4096]).unwrap();

        let mut ctx = Context::new(0);
        let handle = ctx.vfs.open(&path, 0).unwrap();

        let editor = Ext234Editor;
        let mut state = editor.init(&mut ctx);
        assert!(editor.detect(&mut state, &mut ctx, handle, true).is_err());
    }

    #[test]
    fn detect_accepts_minimal_superblock()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fs.img");

        let mut image = vec![0u8; (SUPERBLOCK_OFFSET as usize) + SUPERBLOCK_SIZE + 4096];
        let sb = sb_bytes(128, 8192, 8192, 0);
        image[SUPERBLOCK_OFFSET as usize..SUPERBLOCK_OFFSET as usize + sb.len()].copy_from_slice(&sb);
        std::fs::write(&path, &image).unwrap();

        let mut ctx = Context::new(0);
        let handle = ctx.vfs.open(&path, 0).unwrap();

        let editor = Ext234Editor;
        let mut state = editor.init(&mut ctx);
        editor.detect(&mut state, &mut ctx, handle, true).unwrap();

        let fs = state.downcast_ref::<Ext234State>().unwrap().fs.as_ref().unwrap();
        assert_eq!(fs.bg_count, 1);
    }
}
