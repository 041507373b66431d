//! 实验结果.

use crate::profile::Profile;
use std::io::{self, Write};

/// 将 `profile` 的结果写进 `w` 中.
fn describe_into<W: Write>(name: &str, p: &Profile, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    #[inline]
    fn f64_to_display(f: Option<f64>) -> String {
        match f {
            Some(f) => format!("{f:.4}"),
            None => "/".to_string(),
        }
    }

    writeln!(w, "Profile `{name}`:")?;
    writeln!(w, "{S4}Segmented cases: {}", p.target())?;
    writeln!(w, "{S4}Failed cases: {}", p.failed())?;
    writeln!(w, "{S4}Average dice: {}", f64_to_display(p.avg_dice()))?;
    writeln!(w, "{S4}Foreground voxels: {}", p.foreground())?;
    writeln!(w, "{S4}Effective total time: {} us", p.target_time_us())?;
    writeln!(
        w,
        "{S4}Effective average time: {} us",
        f64_to_display(p.avg_target_time_us())
    )?;
    writeln!(w, "{S4}Total machine time: {} us", p.real_time_us())?;
    let t = p.most_time_consuming().map(|d| d.as_micros().to_string());
    write!(
        w,
        "{S4}Most time-consuming case costs {} us",
        t.unwrap_or_else(|| "/".to_string())
    )?;
    Ok(())
}

/// 消融实验最终结果.
pub struct AblationResult {
    data: Vec<(String, Profile)>,
}

impl FromIterator<(String, Profile)> for AblationResult {
    fn from_iter<I: IntoIterator<Item = (String, Profile)>>(it: I) -> Self {
        Self {
            data: it.into_iter().collect(),
        }
    }
}

impl AblationResult {
    /// 将所有结果写入 `w`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for (name, p) in self.data.iter() {
            utils::sep_to(&mut *w)?;
            describe_into(name, p, w)?;
            writeln!(w)?;
        }
        utils::sep_to(&mut *w)
    }

    /// 平均 Dice 最高的配置.
    pub fn best(&self) -> Option<&str> {
        self.data
            .iter()
            .filter_map(|(n, p)| p.avg_dice().map(|d| (n, d)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(n, _)| n.as_str())
    }
}
