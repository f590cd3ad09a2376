//! Octree snapshot persistence
//!
//! A snapshot stores the packed cell arena and the leaf list; triangle
//! associations are not persisted (they are a build-time acceleration, and
//! a reloaded octree serves resolution and extraction only).

use std::io::{BufReader, BufWriter, Read, Write};

use serde::{Deserialize, Serialize};

use crate::cell::CellData;
use crate::octree::Octree;
use crate::Error;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    depth: u8,
    cells: Vec<u8>,
    leaves: Vec<u64>,
}

/// Writes an octree snapshot with `bincode`
pub fn write_octree<F: Write>(octree: &Octree, out: &mut F) -> Result<(), Error> {
    let snapshot = Snapshot {
        depth: octree.depth(),
        cells: octree.cells().iter().map(|c| c.bits()).collect(),
        leaves: octree.leaves().iter().map(|&l| l as u64).collect(),
    };
    bincode::serialize_into(BufWriter::new(out), &snapshot)?;
    Ok(())
}

/// Reads an octree snapshot, validating the cell encoding and leaf list
pub fn read_octree<F: Read>(input: &mut F) -> Result<Octree, Error> {
    let snapshot: Snapshot = bincode::deserialize_from(BufReader::new(input))?;
    let cells = snapshot
        .cells
        .iter()
        .map(|&b| {
            CellData::try_from_bits(b)
                .ok_or(Error::BadSnapshot("invalid cell encoding"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let leaves = snapshot.leaves.iter().map(|&l| l as usize).collect();
    Octree::from_parts(snapshot.depth, cells, leaves)
}
