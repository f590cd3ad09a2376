//! File formats: STL surfaces in, octree snapshots and VTK meshes out

pub mod octree;
pub mod stl;
pub mod vtk;
