//! 图割相邻项系数与能量截断窗口的消融实验.
//!
//! 数据来自合成体模; 若 `$SEG_DATASET_DIR` (或 `$HOME/dataset/train`) 存在,
//! 同时加载其中的前若干个病例, 种子取参考掩码的稳健中心和包围盒角点.

mod profile;
mod result;
mod runner;

use std::io;

use seg_berry::config::EnergyWindow;
use seg_berry::guide::region_seed;

use runner::{Case, Setting};

/// 从真实数据集加载病例.
fn dataset_cases(n: u32) -> Vec<Case> {
    let Some(dir) = utils::loader::dataset_dir_from_env_or_home().filter(|d| d.is_dir()) else {
        return Vec::new();
    };
    utils::loader::case_loader(&dir, n)
        .filter_map(|(i, r)| match r {
            Ok((volume, reference)) => {
                let seed = region_seed(reference.view(), 1.0)?;
                Some(Case::new(volume, reference, seed.pos))
            }
            Err(e) => {
                log::warn!("case {i}: {e}");
                None
            }
        })
        .collect()
}

fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .expect("logger init");

    let mut cases = runner::phantom_cases();
    cases.extend(dataset_cases(4));

    let settings: Vec<Setting> = [0, 5, 20, 80]
        .into_iter()
        .flat_map(|alpha| {
            [EnergyWindow::default(), EnergyWindow::wide()]
                .map(|window| Setting { alpha, window })
        })
        .collect();

    println!("Running ablation studies...");
    let result = runner::run(&settings, &cases);
    result
        .write_to(&mut io::stdout().lock())
        .expect("write report");
    if let Some(best) = result.best() {
        println!("Best setting: {best}");
    }
    utils::sep();
}
