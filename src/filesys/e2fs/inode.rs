use serde::{Deserialize, Serialize};

// Source: https://elixir.bootlin.com/linux/latest/source/fs/ext4/ext4.h

pub const GOOD_OLD_INODE_SIZE: u16 = 128;
const N_BLOCKS: usize = 15;


/// Ext4 inode.
/// Source: https://elixir.bootlin.com/linux/latest/source/fs/ext4/ext4.h
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Inode {
    pub i_mode: u16,              // File mode
    pub i_uid: u16,               // Low 16 bits of Owner Uid
    pub i_size_lo: u32,           // Size in bytes
    pub i_atime: u32,             // Access time
    pub i_ctime: u32,             // Inode Change time
    pub i_mtime: u32,             // Modification time
    pub i_dtime: u32,             // Deletion Time
    pub i_gid: u16,               // Low 16 bits of Group Id
    pub i_links_count: u16,       // Links count
    pub i_blocks_lo: u32,         // Blocks count
    pub i_flags: u32,             // File flags
    pub osd1: u32,                // OS dependent 1
    pub i_block: [u32; N_BLOCKS], // Pointers to blocks
    pub i_generation: u32,        // File version (for NFS)
    pub i_file_acl_lo: u32,       // File ACL
    pub i_size_high: u32,
    pub i_obso_faddr: u32,        // Obsoleted fragment address
    pub osd2: [u8; 12],           // OS dependent 2
    pub i_extra_isize: u16,
    pub i_checksum_hi: u16,       // crc32c(uuid+inum+inode) BE
    pub i_ctime_extra: u32,       // extra Change time      (nsec << 2 | epoch)
    pub i_mtime_extra: u32,       // extra Modification time(nsec << 2 | epoch)
    pub i_atime_extra: u32,       // extra Access time      (nsec << 2 | epoch)
    pub i_crtime: u32,            // File Creation time
    pub i_crtime_extra: u32,      // extra FileCreationtime (nsec << 2 | epoch)
    pub i_version_hi: u32,        // high 32 bits for 64-bit version
    pub i_projid: u32,            // Project ID
}


pub const INODE_STRUCT_SIZE: usize = 160;


// Source: https://elixir.bootlin.com/linux/latest/source/fs/ext4/ext4.h#L811
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Osd2Linux {
    pub l_i_blocks_high: u16, // were l_i_reserved1
    pub l_i_file_acl_high: u16,
    pub l_i_uid_high: u16,    // these 2 fields
    pub l_i_gid_high: u16,    // were reserved2[0]
    pub l_i_checksum_lo: u16, // crc32c(uuid+inum+inode) LE
    pub l_i_reserved: u16,
}


// Source: https://elixir.bootlin.com/linux/latest/source/fs/ext4/ext4.h#L811
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Osd2Hurd {
    pub h_i_reserved1: u16, // Obsoleted fragment number/size which are removed in ext4
    pub h_i_mode_high: u16,
    pub h_i_uid_high: u16,
    pub h_i_gid_high: u16,
    pub h_i_author: u32,
}


// Source: https://elixir.bootlin.com/linux/latest/source/fs/ext4/ext4.h#L811
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Osd2Masix {
    pub h_i_reserved1: u16,      // Obsoleted fragment number/size which are removed in ext4
    pub m_i_file_acl_high: u16,
    pub m_i_reserved2: [u32; 2],
}


/// Inode flags (i_flags)
pub struct IFlags(pub u32);

impl IFlags {
    pub fn has_secrm(&self)            -> bool { self.0 & 0x1 != 0 }
    pub fn has_unrm(&self)             -> bool { self.0 & 0x2 != 0 }
    pub fn has_compr(&self)            -> bool { self.0 & 0x4 != 0 }
    pub fn has_sync(&self)             -> bool { self.0 & 0x8 != 0 }
    pub fn has_immutable(&self)        -> bool { self.0 & 0x10 != 0 }
    pub fn has_append(&self)           -> bool { self.0 & 0x20 != 0 }
    pub fn has_nodump(&self)           -> bool { self.0 & 0x40 != 0 }
    pub fn has_noatime(&self)          -> bool { self.0 & 0x80 != 0 }
    pub fn has_dirty(&self)            -> bool { self.0 & 0x100 != 0 }
    pub fn has_comprblk(&self)         -> bool { self.0 & 0x200 != 0 }
    pub fn has_nocompr(&self)          -> bool { self.0 & 0x400 != 0 }
    pub fn has_encrypt(&self)          -> bool { self.0 & 0x800 != 0 }
    pub fn has_index(&self)            -> bool { self.0 & 0x1000 != 0 }
    pub fn has_imagic(&self)           -> bool { self.0 & 0x2000 != 0 }
    pub fn has_journal_data(&self)     -> bool { self.0 & 0x4000 != 0 }
    pub fn has_notail(&self)           -> bool { self.0 & 0x8000 != 0 }
    pub fn has_dirsync(&self)          -> bool { self.0 & 0x10000 != 0 }
    pub fn has_topdir(&self)           -> bool { self.0 & 0x20000 != 0 }
    pub fn has_huge_file(&self)        -> bool { self.0 & 0x40000 != 0 }
    pub fn has_extents(&self)          -> bool { self.0 & 0x80000 != 0 }
    pub fn has_verity(&self)           -> bool { self.0 & 0x100000 != 0 }
    pub fn has_ea_inode(&self)         -> bool { self.0 & 0x200000 != 0 }
    pub fn has_eofblocks(&self)        -> bool { self.0 & 0x400000 != 0 }
    // 0x800000 missing.
    pub fn has_snapfile(&self)         -> bool { self.0 & 0x1000000 != 0 }
    // 0x2000000 missing.
    pub fn has_snapfile_deleted(&self) -> bool { self.0 & 0x4000000 != 0 }
    pub fn has_snapfile_shrunk(&self)  -> bool { self.0 & 0x8000000 != 0 }
    pub fn has_inline_data(&self)      -> bool { self.0 & 0x10000000 != 0 }
    pub fn has_projinherit(&self)      -> bool { self.0 & 0x20000000 != 0 }
    // 0x40000000 missing.
    pub fn has_reserved(&self)         -> bool { self.0 & 0x80000000 != 0 }

    pub fn get_unknown(&self) -> u32
    {
        (self.0 & 0x800000) | (self.0 & 0x2000000) | (self.0 & 0x40000000)
    }

    pub fn has_unknown(&self) -> bool
    {
        self.get_unknown() != 0
    }
}


/// Inode mode (i_mode)
pub struct IMode(pub u16);

impl IMode {
    pub fn has_ixoth(&self)  -> bool { self.0 & 0x1 != 0}
    pub fn has_iwoth(&self)  -> bool { self.0 & 0x2 != 0}
    pub fn has_iroth(&self)  -> bool { self.0 & 0x4 != 0}
    pub fn has_ixgrp(&self)  -> bool { self.0 & 0x8 != 0}
    pub fn has_iwgrp(&self)  -> bool { self.0 & 0x10 != 0}
    pub fn has_irgrp(&self)  -> bool { self.0 & 0x20 != 0}
    pub fn has_ixusr(&self)  -> bool { self.0 & 0x40 != 0}
    pub fn has_iwusr(&self)  -> bool { self.0 & 0x80 != 0}
    pub fn has_irusr(&self)  -> bool { self.0 & 0x100 != 0}
    pub fn has_isvtx(&self)  -> bool { self.0 & 0x200 != 0}
    pub fn has_isgid(&self)  -> bool { self.0 & 0x400 != 0}
    pub fn has_isuid(&self)  -> bool { self.0 & 0x800 != 0}
    pub fn has_ififo(&self)  -> bool { self.0 & 0x1000 != 0}
    pub fn has_ifchr(&self)  -> bool { self.0 & 0x2000 != 0}
    pub fn has_ifdir(&self)  -> bool { self.0 & 0x4000 != 0}
    pub fn has_ifblk(&self)  -> bool { self.has_ifchr() && self.has_ifdir() }
    pub fn has_ifreg(&self)  -> bool { self.0 & 0x8000 != 0}
    pub fn has_iflnk(&self)  -> bool { self.has_ifchr() && self.has_ifreg() }
    pub fn has_ifsock(&self) -> bool { self.has_ifdir() && self.has_ifreg() }

    pub fn get_unknown(&self) -> u32 { 0 }

    pub fn has_unknown(&self) -> bool
    {
        self.get_unknown() != 0
    }
}


/// Osd2 structure (i_osd2)
#[derive(Copy, Clone, Debug)]
pub enum Osd2 {
    Linux(Osd2Linux),
    Hurd(Osd2Hurd),
    Masix(Osd2Masix),
}


/// Ext2 file types (plus some custom ones).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InodeType {
    Fifo,
    Character,
    Directory,
    Block,
    Regular,
    SymLink,
    Socket,
    Ea,
    Journal,
}

impl InodeType {
    /// Classifies an inode by its `i_mode`, falling back to `None` for the
    /// zeroed-out reserved inodes the original's `scan_inode` treated as
    /// "skip, not an error".
    pub fn classify(i_mode: u16, is_journal_inode: bool, i_flags: &IFlags) -> Option<Self>
    {
        let mode = IMode(i_mode);

        if is_journal_inode {
            return Some(InodeType::Journal);
        }
        if i_flags.has_ea_inode() {
            return Some(InodeType::Ea);
        }
        if mode.has_ifsock() {
            Some(InodeType::Socket)
        } else if mode.has_iflnk() {
            Some(InodeType::SymLink)
        } else if mode.has_ifblk() {
            Some(InodeType::Block)
        } else if mode.has_ifreg() {
            Some(InodeType::Regular)
        } else if mode.has_ifdir() {
            Some(InodeType::Directory)
        } else if mode.has_ifchr() {
            Some(InodeType::Character)
        } else if mode.has_ififo() {
            Some(InodeType::Fifo)
        } else {
            None
        }
    }
}
