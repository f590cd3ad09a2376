//! Legacy-ASCII VTK output for hex meshes

use std::io::{BufWriter, Write};

use crate::hex::HexMesh;
use crate::Error;

/// Our corner numbering walks the X bit fastest; `VTK_HEXAHEDRON` wants the
/// bottom face as a loop, then the top face as a loop
const VTK_ORDER: [usize; 8] = [0, 1, 3, 2, 4, 5, 7, 6];

/// Writes the mesh as a legacy-ASCII VTK unstructured grid
///
/// When `quality` is given (one value per element, e.g. from
/// [`scaled_jacobian`](crate::geometry::scaled_jacobian)) it is attached as
/// `CELL_DATA` so viewers can color elements by it.
pub fn write_vtk<F: Write>(
    mesh: &HexMesh,
    quality: Option<&[f64]>,
    out: &mut F,
) -> Result<(), Error> {
    debug_assert!(quality.map_or(true, |q| q.len() == mesh.elems.len()));
    let mut out = BufWriter::new(out);
    writeln!(out, "# vtk DataFile Version 3.0")?;
    writeln!(out, "hexroot all-hex mesh")?;
    writeln!(out, "ASCII")?;
    writeln!(out, "DATASET UNSTRUCTURED_GRID")?;

    writeln!(out, "POINTS {} double", mesh.vertices.len())?;
    for v in &mesh.vertices {
        writeln!(out, "{} {} {}", v.x, v.y, v.z)?;
    }

    let n = mesh.elems.len();
    writeln!(out, "CELLS {n} {}", n * 9)?;
    for e in &mesh.elems {
        write!(out, "8")?;
        for &c in &VTK_ORDER {
            write!(out, " {}", e[c])?;
        }
        writeln!(out)?;
    }
    writeln!(out, "CELL_TYPES {n}")?;
    for _ in 0..n {
        writeln!(out, "12")?; // VTK_HEXAHEDRON
    }

    if let Some(quality) = quality {
        writeln!(out, "CELL_DATA {n}")?;
        writeln!(out, "SCALARS scaled_jacobian double 1")?;
        writeln!(out, "LOOKUP_TABLE default")?;
        for q in quality {
            writeln!(out, "{q}")?;
        }
    }
    Ok(())
}
