//! L5: the magic-search scanner (spec sec. 4.4), grounded on
//! `struct imgmagic`'s `next_search_offset` cursor field in
//! `examples/original_source/imgeditor.h`.

use std::path::Path;

use crate::context::Context;
use crate::editor::registry::Registry;

const WINDOW: usize = 4 * 1024 * 1024;
const OVERLAP: usize = 1024;

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub editor_name: &'static str,
    pub offset: u64,
}

/// Scans `path` (opened through `base_offset`, e.g. a user-supplied
/// `--offset`/`--sector`) for every registered editor's magic signature.
/// Ordering guarantee (spec sec. 4.4): strictly ascending by `offset`; a
/// single offset may be reported by two different editors if their magics
/// overlap (spec sec. 9's open question — intentional, not deduped).
pub fn scan(ctx: &mut Context, registry: &Registry, path: &Path, base_offset: u64) -> anyhow::Result<Vec<SearchHit>>
{
    let handle = ctx.vfs.open(path, base_offset)?;
    let total_len = ctx.vfs.filelength(handle)?;

    let mut cursors: Vec<u64> = vec![0; registry.len()];
    let mut hits = Vec::new();

    let mut window_start: u64 = 0;
    while window_start < total_len {
        let read_start = window_start.saturating_sub(OVERLAP as u64);
        let mut buf = vec![0u8; WINDOW + OVERLAP];
        ctx.vfs.fileseek(handle, read_start)?;
        let n = ctx.vfs.fileread(handle, &mut buf)?;
        buf.truncate(n);

        for (idx, editor) in registry.iter().enumerate() {
            let magic = match editor.search_magic() {
                Some(m) => m,
                None => continue,
            };
            if magic.pattern.is_empty() {
                continue;
            }

            let cursor = cursors[idx].max(read_start);
            let rel_start = (cursor - read_start) as usize;

            let mut search_from = rel_start;
            while let Some(found) = find_subslice(&buf[search_from.min(buf.len())..], magic.pattern) {
                let match_rel = search_from + found;
                let match_abs = read_start + match_rel as u64;

                cursors[idx] = match_abs + 1;
                search_from = match_rel + 1;

                if (magic.offset_in_header as u64) > match_abs {
                    continue;
                }
                let img_offset = match_abs - magic.offset_in_header as u64;
                if img_offset + editor.header_size() as u64 > total_len {
                    continue;
                }

                ctx.in_search_mode = true;
                let mut state = editor.init(ctx);
                let dup = ctx.vfs.dup(handle, img_offset)?;
                let result = editor.detect(&mut state, ctx, dup, true);
                ctx.vfs.close(dup);
                editor.exit(state, ctx);
                ctx.in_search_mode = false;

                if result.is_ok() {
                    hits.push(SearchHit { editor_name: editor.name(), offset: img_offset });
                }

                if search_from >= buf.len() {
                    break;
                }
            }
        }

        window_start += WINDOW as u64;
    }

    hits.sort_by_key(|h| h.offset);
    ctx.vfs.close(handle);

    Ok(hits)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize>
{
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Formats the search-result table (spec sec. 6.4).
pub fn format_table(ctx: &Context, hits: &[SearchHit]) -> String
{
    let mut out = String::new();
    for hit in hits {
        let sector = hit.offset / 512;
        let partition = ctx
            .partitions
            .find(hit.offset)
            .map(|(kind, part)| format!("{}.{}", kind.name(), part.name))
            .unwrap_or_default();

        out.push_str(&format!(
            "{:<20} {:#010x}({})  {:#010x}({})  {}\n",
            hit.editor_name, hit.offset, hit.offset, sector, sector, partition
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::{Editor, EditorState, SearchMagic};
    use crate::vfs::VfHandle;
    use std::io::Write;
    use std::sync::Arc;

    struct MagicEditor(&'static str, &'static [u8]);
    impl Editor for MagicEditor {
        fn name(&self) -> &'static str { self.0 }
        fn descriptor(&self) -> &'static str { "test" }
        fn header_size(&self) -> usize { self.1.len() }
        fn search_magic(&self) -> Option<SearchMagic>
        {
            Some(SearchMagic { pattern: self.1, offset_in_header: 0 })
        }
        fn detect(
            &self,
            _s: &mut EditorState,
            _c: &mut Context,
            _h: VfHandle,
            _f: bool,
        ) -> anyhow::Result<()>
        {
            Ok(())
        }
    }

    /// Spec sec. 8.9: search ordering.
    #[test]
    fn reports_in_ascending_offset_order()
    {
        let mut data = vec![0u8; 64];
        data[8..12].copy_from_slice(b"AAAA");
        data[40..44].copy_from_slice(b"BBBB");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let mut registry = Registry::new();
        registry.register(Arc::new(MagicEditor("second", b"BBBB")));
        registry.register(Arc::new(MagicEditor("first", b"AAAA")));

        let mut ctx = Context::new(0);
        let hits = scan(&mut ctx, &registry, file.path(), 0).unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].offset, 8);
        assert_eq!(hits[0].editor_name, "first");
        assert_eq!(hits[1].offset, 40);
        assert_eq!(hits[1].editor_name, "second");
    }
}
