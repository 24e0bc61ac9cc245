//! Asset parsers producing CPU-side data for the renderer to upload.
//! Currently: the QM binary mesh format (geometry + subsets + materials).

pub mod qm;
