//! Aggregation based algebraic multigrid for sparse symmetric positive
//! definite systems.
//!
//! <br>
//!
//! Construction goes from the fine matrix to a chain of coarse operators:
//! the matrix of a level is viewed as a graph ([`graph`]), its couplings
//! are classified as strong or weak ([`dependency`]), strongly connected
//! vertices are grouped into small aggregates ([`aggregation`]) and the
//! aggregates define a piecewise constant transfer operator from which the
//! next coarse matrix is formed by the Galerkin product ([`interpolation`]).
//! [`hierarchy`] repeats this until the coarse problem is small enough, the
//! coarsening stalls, or the level limit is reached.
//!
//! At solve time [`amg::Amg`] walks the hierarchy with V- or W-cycles,
//! smoothing on every level with one of the smoothers in
//! [`preconditioner`] and solving the coarsest problem with a sparse
//! direct factorization. The resulting preconditioner plugs into the
//! drivers in [`solver`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use paamg::amg::{Amg, CycleParams};
//! use paamg::criterion::CoarseningCriterion;
//! use paamg::hierarchy::HierarchyBuilder;
//! use paamg::preconditioner::SmootherType;
//! use paamg::solver::pcg;
//! use paamg::utils::{laplace_2d, random_vec};
//!
//! let mat = Arc::new(laplace_2d(64, 64, 1.0));
//! let hierarchy = HierarchyBuilder::new(CoarseningCriterion::default())
//!     .build(mat.clone())
//!     .unwrap();
//! let mut amg =
//!     Amg::new(hierarchy, SmootherType::SymmetricGaussSeidel, CycleParams::default()).unwrap();
//! let b = random_vec(mat.rows());
//! let (_x, info) = pcg(&mat, &b, &paamg::Vector::zeros(mat.rows()), 100, 1e-8, &mut amg).unwrap();
//! println!("{:?}", info);
//! ```

use ndarray::Array1;
use sprs::{CsMatBase, TriMatBase};
use sprs_ldl::LdlNumeric;

#[macro_use]
extern crate log;
extern crate approx;

pub mod aggregation;
pub mod amg;
pub mod criterion;
pub mod dependency;
pub mod error;
pub mod graph;
pub mod hierarchy;
pub mod interpolation;
pub mod ownership;
pub mod parallel_ops;
pub mod preconditioner;
pub mod solver;
pub mod utils;

pub type CsrMatrix = CsMatBase<f64, usize, Vec<usize>, Vec<usize>, Vec<f64>, usize>;
pub type CooMatrix = TriMatBase<Vec<usize>, Vec<f64>>;
pub type Vector = Array1<f64>;
pub type Cholesky = LdlNumeric<f64, usize>;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use lazy_static::lazy_static;

lazy_static! {
    // `PAAMG_OUTPUT` overrides the timestamped default.
    static ref OUTPUT_DIR: PathBuf = match std::env::var("PAAMG_OUTPUT") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => {
            let ts = Local::now().format("%Y-%m-%d_%H:%M:%S").to_string();
            Path::new("./output").join(ts)
        }
    };
    pub static ref N_CPUS: usize = num_cpus::get();
}

/// Helper to build paths inside the output directory.
///
/// ```no_run
/// use std::io::Write;
///
/// paamg::create_output_dir().unwrap();
/// let path = paamg::output_path("example.txt");
/// let mut f = std::fs::File::create(&path).unwrap();
/// writeln!(f, "Hello, world!").unwrap();
/// ```
pub fn output_path<S: AsRef<Path>>(file: S) -> PathBuf {
    OUTPUT_DIR.join(file)
}

/// Creates the output directory if it does not exist yet.
pub fn create_output_dir() -> error::Result<PathBuf> {
    fs::create_dir_all(&*OUTPUT_DIR)?;
    Ok(OUTPUT_DIR.clone())
}
