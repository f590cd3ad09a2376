//! Adaptive-octree all-hexahedral mesh generation from triangulated
//! surfaces.
//!
//! The pipeline turns a closed triangle surface into a conforming all-hex
//! volume mesh:
//!
//! 1. [`Surface`] wraps the triangle soup in a margined bounding cube.
//! 2. [`Octree::build`] refines cells that cross the surface (and cells
//!    whose nearest surface feature is closer than their own size) down to
//!    a target depth.
//! 3. [`Octree::balance`] enforces the strong 2:1 rule across face, edge,
//!    and corner adjacency.
//! 4. [`dual::extract_dual_hex`] emits one hexahedron per interior octree
//!    grid vertex, connecting the surrounding leaf centers.
//! 5. [`quality::remove_outside`] drops elements reaching outside the
//!    surface; [`quality::flag_poor_quality`] reports elements with a poor
//!    scaled Jacobian.
//! 6. [`project::project_boundary`] snaps the mesh boundary onto the
//!    surface.
//!
//! Here's a full example:
//!
//! ```
//! use hexroot::{Octree, Settings, Surface};
//! use nalgebra::Point3;
//!
//! let surface = Surface::cube(Point3::new(0.0, 0.0, 0.0), 1.0, 0.5);
//! let settings = Settings {
//!     depth: 3,
//!     ..Settings::default()
//! };
//! let mut octree = Octree::build(&surface, &settings)?;
//! octree.balance(&surface, &settings)?;
//!
//! let mut mesh = hexroot::dual::extract_dual_hex(&octree, &surface);
//! hexroot::quality::remove_outside(&mut mesh);
//! hexroot::project::project_boundary(&mut mesh, &surface, &octree);
//! assert!(!mesh.elems.is_empty());
//!
//! // Open a file to write, e.g.
//! // let mut f = std::fs::File::create("out.vtk")?;
//! # let mut f = vec![];
//! hexroot::io::vtk::write_vtk(&mesh, None, &mut f)?;
//! # Ok::<(), hexroot::Error>(())
//! ```

mod cell;
mod error;

pub mod dual;
pub mod geometry;
pub mod hex;
pub mod io;
pub mod octree;
pub mod project;
pub mod quality;
pub mod surface;
pub mod types;

pub use cell::{Cell, CellData};
pub use error::Error;
pub use hex::HexMesh;
pub use octree::Octree;
pub use surface::Surface;

/// Settings for octree construction and the downstream mesh pipeline
#[derive(Copy, Clone, Debug)]
pub struct Settings {
    /// Depth to recurse in the octree
    pub depth: u8,

    /// Extra space around the surface's bounding box, as a fraction of its
    /// largest extent
    ///
    /// A non-zero margin keeps the surface away from the domain boundary so
    /// that every boundary-adjacent dual element is removed as outside.
    pub margin_ratio: f64,

    /// Refinement threshold for cells near (but not crossing) the surface,
    /// as a fraction of the cell size
    ///
    /// A cell whose center is closer to the surface than
    /// `feature_distance_ratio x cell size` is subdivided.
    pub feature_distance_ratio: f64,

    /// Minimum acceptable scaled Jacobian when flagging element quality
    pub quality_threshold: f64,

    /// Upper bound on balance refinement sweeps before giving up with
    /// [`Error::BalanceOverflow`]
    pub max_balance_passes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            depth: 4,
            margin_ratio: 0.2,
            feature_distance_ratio: 1.0,
            quality_threshold: 0.2,
            max_balance_passes: 64,
        }
    }
}
