use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use paamg::amg::{Amg, CycleParams, CycleType};
use paamg::criterion::CoarseningCriterion;
use paamg::hierarchy::{HierarchySummary, MatrixHierarchy};
use paamg::parallel_ops::spmv;
use paamg::preconditioner::SmootherType;
use paamg::solver::{pcg, stationary, CoarseSolverType, IterativeMethod, SolveInfo};
use paamg::utils::{format_duration, load_matrix, norm, random_vec};
use paamg::{create_output_dir, output_path, Vector, N_CPUS};
use serde::Serialize;
use structopt::StructOpt;

#[macro_use]
extern crate log;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "amg_solve",
    about = "Builds an aggregation AMG hierarchy for a matrix and solves a random system with it"
)]
struct Opt {
    /// Matrix file in matrix market format
    #[structopt(parse(from_os_str))]
    input: PathBuf,

    /// JSON file with the coarsening criterion, missing fields take
    /// their defaults
    #[structopt(short, long, parse(from_os_str))]
    criterion: Option<PathBuf>,

    /// Smoother used on every level. Options are:
    /// jacobi, l1, fgs, bgs, sgs
    #[structopt(short, long, default_value = "sgs")]
    smoother: SmootherType,

    /// Options are: v, w
    #[structopt(long, default_value = "v")]
    cycle: CycleType,

    #[structopt(long, default_value = "1")]
    pre_smoothing: usize,

    #[structopt(long, default_value = "1")]
    post_smoothing: usize,

    /// Options are: direct, iterative
    #[structopt(long, default_value = "direct")]
    coarse_solver: CoarseSolverType,

    /// Options are: pcg, stationary
    #[structopt(long, default_value = "pcg")]
    method: IterativeMethod,

    /// Maximum number of iterations to perform
    #[structopt(long, default_value = "500")]
    max_iter: usize,

    /// Stop iterations after the relative residual is less than tolerance
    #[structopt(long, default_value = "1e-8")]
    tolerance: f64,

    /// Don't write the json summary to the output directory
    #[structopt(long)]
    no_output: bool,
}

#[derive(Serialize)]
struct RunSummary {
    matrix: String,
    hierarchy: HierarchySummary,
    cycle: CycleParams,
    smoother: SmootherType,
    method: IterativeMethod,
    construction_time: String,
    solve_time: String,
    solve_info: SolveInfo,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let opt = Opt::from_args();
    rayon::ThreadPoolBuilder::new()
        .num_threads(*N_CPUS)
        .build_global()?;

    let criterion = match &opt.criterion {
        Some(path) => CoarseningCriterion::from_json_file(path)?,
        None => CoarseningCriterion::default(),
    };
    let params = CycleParams::default()
        .with_cycle(opt.cycle)
        .with_smoothing_steps(opt.pre_smoothing, opt.post_smoothing)
        .with_coarse_solver(opt.coarse_solver);

    let mat = Arc::new(load_matrix(&opt.input)?);
    let dim = mat.rows();
    info!("loaded {:?}: {} rows, {} nnz", opt.input, dim, mat.nnz());

    let timer = Instant::now();
    let hierarchy = MatrixHierarchy::build(mat.clone(), &criterion)?;
    let mut amg = Amg::new(hierarchy, opt.smoother, params)?;
    let construction_time = timer.elapsed();
    info!(
        "preconditioner built in: {}",
        format_duration(&construction_time)
    );

    let x_true = random_vec(dim);
    let b = spmv(&mat, &x_true);
    let guess = Vector::zeros(dim);

    let timer = Instant::now();
    let (x, solve_info) = match opt.method {
        IterativeMethod::ConjugateGradient => {
            pcg(&mat, &b, &guess, opt.max_iter, opt.tolerance, &mut amg)?
        }
        IterativeMethod::StationaryIteration => {
            stationary(&mat, &b, &guess, opt.max_iter, opt.tolerance, &mut amg)?
        }
    };
    let solve_time = timer.elapsed();
    let error = norm(&(&x - &x_true)) / norm(&x_true);
    info!(
        "{} finished after {} iterations in {}, converged: {}, relative error: {:.3e}",
        opt.method,
        solve_info.iterations,
        format_duration(&solve_time),
        solve_info.converged,
        error
    );

    if !opt.no_output {
        create_output_dir()?;
        let summary = RunSummary {
            matrix: opt.input.display().to_string(),
            hierarchy: amg.hierarchy().summary(),
            cycle: params,
            smoother: opt.smoother,
            method: opt.method,
            construction_time: format_duration(&construction_time),
            solve_time: format_duration(&solve_time),
            solve_info,
        };
        let path = output_path("summary.json");
        serde_json::to_writer_pretty(File::create(&path)?, &summary)?;
        info!("wrote summary to {}", path.display());
    }
    Ok(())
}
