use crate::cell::*;
use crate::error::Error;

/// Creates a pruned branch cell with the specified merkle depth.
///
/// The pruned branch keeps hashes and depths of the original cell
/// for all its significant levels.
pub fn make_pruned_branch(
    cell: &DynCell,
    merkle_depth: u8,
    context: &dyn CellContext,
) -> Result<Cell, Error> {
    if merkle_depth >= LevelMask::MAX_LEVEL {
        return Err(Error::InvalidCell);
    }

    let cell_level_mask = cell.level_mask();
    let level_mask = cell_level_mask | LevelMask::new(1 << merkle_depth);
    let level = level_mask.level() as usize;

    let mut levels = [0u8; LevelMask::MAX_LEVEL as usize];
    let mut count = 0;
    for l in 0..=LevelMask::MAX_LEVEL {
        if count < level && level_mask.contains(l) {
            levels[count] = l;
            count += 1;
        }
    }
    let levels = &levels[..count];

    let mut builder = CellBuilder::new();
    builder.set_exotic(true);
    ok!(builder.store_u8(CellType::PrunedBranch.to_byte()));
    ok!(builder.store_u8(level_mask.to_byte()));
    for l in levels {
        ok!(builder.store_u256(cell.hash(*l)));
    }
    for l in levels {
        ok!(builder.store_u16(cell.depth(*l)));
    }

    builder.build_ext(context)
}
