//! Ext2/3/4 on-disk layout: reusable `SuperBlock`/`GroupDescriptor`/`Inode`
//! struct definitions and their flag decoders, consumed by
//! `crate::editors::ext2`.

pub mod e2fs;
