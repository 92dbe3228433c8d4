//! Loads `user-agents.txt` for `--random-agent`: one non-empty, non-blank
//! line picked uniformly at random at startup.

use std::path::Path;

use rand::Rng;

pub fn load(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
}

pub fn pick_random(agents: &[String]) -> Option<String> {
    if agents.is_empty() {
        return None;
    }
    let idx = rand::thread_rng().gen_range(0..agents.len());
    Some(agents[idx].clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_random_returns_none_for_empty_list() {
        assert!(pick_random(&[]).is_none());
    }

    #[test]
    fn pick_random_returns_a_listed_agent() {
        let agents = vec!["a".to_string(), "b".to_string()];
        let picked = pick_random(&agents).unwrap();
        assert!(agents.contains(&picked));
    }
}
