//! Binary STL input and output

use std::collections::HashMap;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};

use log::debug;
use nalgebra::Point3;

use crate::Error;

/// Reads a binary STL, welding identical vertices
///
/// Vertices are welded on exact 32-bit equality, which reconnects the
/// per-facet vertex soup of a well-formed STL without moving anything.
/// Facets whose welded corners are not distinct are dropped. ASCII STL is
/// not supported and is reported as [`Error::BadStl`].
pub fn read_stl<F: Read>(
    input: &mut F,
) -> Result<(Vec<Point3<f64>>, Vec<[u32; 3]>), Error> {
    let mut input = BufReader::new(input);
    let mut header = [0u8; 80];
    read_chunk(&mut input, &mut header)?;
    if header.starts_with(b"solid ") {
        return Err(Error::BadStl);
    }
    let mut count_buf = [0u8; 4];
    read_chunk(&mut input, &mut count_buf)?;
    let count = u32::from_le_bytes(count_buf);

    let mut vertices = vec![];
    let mut triangles = Vec::with_capacity(count as usize);
    let mut weld: HashMap<[u32; 3], u32> = HashMap::new();
    let mut degenerate = 0usize;

    // normal (12) + 3 vertices (36) + attribute count (2)
    let mut record = [0u8; 50];
    for _ in 0..count {
        read_chunk(&mut input, &mut record)?;
        let mut tri = [0u32; 3];
        for (v, out) in tri.iter_mut().enumerate() {
            let base = 12 + v * 12;
            let bits = [
                u32::from_le_bytes(record[base..base + 4].try_into().unwrap()),
                u32::from_le_bytes(record[base + 4..base + 8].try_into().unwrap()),
                u32::from_le_bytes(record[base + 8..base + 12].try_into().unwrap()),
            ];
            *out = *weld.entry(bits).or_insert_with(|| {
                vertices.push(Point3::new(
                    f32::from_bits(bits[0]) as f64,
                    f32::from_bits(bits[1]) as f64,
                    f32::from_bits(bits[2]) as f64,
                ));
                vertices.len() as u32 - 1
            });
        }
        if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
            degenerate += 1;
            continue;
        }
        triangles.push(tri);
    }
    if degenerate > 0 {
        debug!("dropped {degenerate} degenerate STL facets");
    }
    Ok((vertices, triangles))
}

/// Writes a binary STL with per-facet normals recomputed from the geometry
pub fn write_stl<F: Write>(
    vertices: &[Point3<f64>],
    triangles: &[[u32; 3]],
    out: &mut F,
) -> Result<(), Error> {
    // Many small writes, typically to a file, so a `BufWriter` saves
    // excessive syscalls
    let mut out = BufWriter::new(out);
    const HEADER: &[u8] = b"Binary STL exported by hexroot";
    static_assertions::const_assert!(HEADER.len() <= 80);
    out.write_all(HEADER)?;
    out.write_all(&[0u8; 80 - HEADER.len()])?;
    out.write_all(&(triangles.len() as u32).to_le_bytes())?;
    for t in triangles {
        let a = vertices[t[0] as usize];
        let b = vertices[t[1] as usize];
        let c = vertices[t[2] as usize];
        let normal = (b - a).cross(&(c - a));
        for p in &normal {
            out.write_all(&(*p as f32).to_le_bytes())?;
        }
        for &v in t {
            for p in &vertices[v as usize].coords {
                out.write_all(&(*p as f32).to_le_bytes())?;
            }
        }
        out.write_all(&[0u8; std::mem::size_of::<u16>()])?; // attributes
    }
    Ok(())
}

fn read_chunk<F: Read>(input: &mut F, buf: &mut [u8]) -> Result<(), Error> {
    input.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            Error::BadStl
        } else {
            Error::IoError(e)
        }
    })
}
