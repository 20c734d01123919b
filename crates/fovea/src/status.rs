//! `fovea status`: tier occupancy and model maturity for the current
//! project.

use fovea_core::{AttentionState, Config};
use fovea_learn::{Learner, Predictor};
use fovea_store::Paths;

pub fn run() -> anyhow::Result<()> {
    let paths = Paths::resolve_cwd()?;

    let config = Config::load(&paths.keywords_config(), &paths.overrides_config());
    let state = AttentionState::load(&paths.attn_state());
    let learner = Learner::load(&paths.learned_state());
    let predictor = Predictor::load(&paths.predictor_model());

    let mut hot = Vec::new();
    let mut warm = 0usize;
    let mut cold = 0usize;
    for (path, &score) in &state.scores {
        if score >= config.hot_threshold {
            hot.push(path.clone());
        } else if score >= config.warm_threshold {
            warm += 1;
        } else {
            cold += 1;
        }
    }
    hot.sort();

    println!("project: {}", paths.project_root().display());
    println!("turns:   {}", state.turn_count);
    println!(
        "tiers:   {} hot / {} warm / {} cold",
        hot.len(),
        warm,
        cold
    );
    for path in &hot {
        println!("  hot: {}", path);
    }
    println!(
        "learner: {:?} ({} turns observed)",
        learner.maturity(),
        learner.turn_count()
    );
    match predictor {
        Some(predictor) => println!("predictor: trained on {} turns", predictor.turn_count()),
        None => println!("predictor: no model"),
    }
    println!("keywords: {} entries", config.keywords.len());

    Ok(())
}
