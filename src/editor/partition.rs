//! L5: disk-partition registry (spec sec. 3.6 / 4.7), grounded on
//! `examples/original_source/disk_partition.c` and the
//! `disk_partition`/`disk_partitions` structs in `imgeditor.h`.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionTableKind {
    Gpt,
    Mbr,
    Other,
}

impl PartitionTableKind {
    pub fn name(self) -> &'static str
    {
        match self {
            PartitionTableKind::Gpt => "gpt",
            PartitionTableKind::Mbr => "mbr",
            PartitionTableKind::Other => "others",
        }
    }
}

/// Trust-score constants from `imgeditor.h`
/// (`DISK_PARTITIONS_SCORE_{WEAK,NORMAL,GOOD,PERFECT}`).
pub mod score {
    pub const WEAK: u32 = 10;
    pub const NORMAL: u32 = 20;
    pub const GOOD: u32 = 80;
    pub const PERFECT: u32 = 100;
}

#[derive(Clone, Debug)]
pub struct Partition {
    pub name: String,
    pub start_addr: u64,
    pub end_addr: u64,
}

#[derive(Clone, Debug)]
pub struct PartitionTable {
    pub kind: PartitionTableKind,
    pub score: u32,
    pub parts: Vec<Partition>,
}

/// Populated during detection of partition-bearing containers (GPT/MBR),
/// consulted only by search-mode annotation. Cleared at the end of every
/// dispatch (`free_registed_disk_partitions` in the original).
#[derive(Default)]
pub struct PartitionRegistry {
    tables: Vec<PartitionTable>,
}

impl PartitionRegistry {
    pub fn new() -> Self { Self { tables: Vec::new() } }

    pub fn register(&mut self, table: PartitionTable)
    {
        self.tables.push(table);
    }

    pub fn clear(&mut self)
    {
        self.tables.clear();
    }

    /// `find_registed_partition`: first table whose partition's
    /// `[start_addr, end_addr]` (inclusive) contains `addr`.
    pub fn find(&self, addr: u64) -> Option<(PartitionTableKind, &Partition)>
    {
        for table in &self.tables {
            for part in &table.parts {
                if addr >= part.start_addr && addr <= part.end_addr {
                    return Some((table.kind, part));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_containing_partition()
    {
        let mut reg = PartitionRegistry::new();
        reg.register(PartitionTable {
            kind: PartitionTableKind::Gpt,
            score: score::PERFECT,
            parts: vec![
                Partition { name: "boot".into(), start_addr: 0x10_0000, end_addr: 0x1F_FFFF },
                Partition { name: "root".into(), start_addr: 0x20_0000, end_addr: 0x7F_FFFF },
            ],
        });

        let (kind, part) = reg.find(0x18_0000).unwrap();
        assert_eq!(kind, PartitionTableKind::Gpt);
        assert_eq!(part.name, "boot");

        assert!(reg.find(0x0F_FFFF).is_none());
    }
}
