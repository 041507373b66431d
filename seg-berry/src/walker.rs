//! 三维随机游走. 通过文件协议调用外部可执行程序.
//!
//! 输入 `data.bin`: 3 个 `i16` 形状, 随后是 `i16` 体数据 (C 顺序, 小端).
//! 种子 `points.txt`: 第一行 `0,D,0,H,0,W`, 之后每行 `1,z,y,x` (前景) 或
//! `0,z,y,x` (背景), 最后一行 `end`. 输出 `out.bin` 与输入同格式, 非零为前景.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use ndarray::{Array3, ArrayView3};
use num::ToPrimitive;

use crate::algo::Segmenter;
use crate::config::WalkerConfig;
use crate::data::{BBox, SeedSet, Volume};
use crate::error::{SegError, SegResult};
use crate::Idx3d;

/// 外部随机游走程序.
#[derive(Clone, Debug)]
pub struct RandomWalker {
    executable: PathBuf,
}

/// 写入 `i16` 小端形状与数据. 灰度先取整并截断到 `i16` 范围.
fn write_volume<W: Write>(w: &mut W, patch: ArrayView3<f32>) -> io::Result<()> {
    let (d, h, w_) = patch.dim();
    for n in [d, h, w_] {
        let n = n
            .to_i16()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "patch too large"))?;
        w.write_all(&n.to_le_bytes())?;
    }
    for &v in patch.iter() {
        let v = v
            .round()
            .clamp(i16::MIN as f32, i16::MAX as f32)
            .to_i16()
            .unwrap_or(0);
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

/// 写入种子文件. `seeds` 为局部坐标.
fn write_points<W: Write>(w: &mut W, (d, h, w_): Idx3d, seeds: &SeedSet) -> io::Result<()> {
    writeln!(w, "0,{d},0,{h},0,{w_}")?;
    for s in seeds.foreground.iter() {
        let (z, y, x) = s.pos;
        writeln!(w, "1,{z},{y},{x}")?;
    }
    for s in seeds.background.iter() {
        let (z, y, x) = s.pos;
        writeln!(w, "0,{z},{y},{x}")?;
    }
    write!(w, "end")
}

/// 读取外部程序输出, 校验形状.
fn read_labels<R: Read>(r: &mut R, expected: Idx3d) -> SegResult<Array3<u8>> {
    let mut buf = Vec::new();
    r.read_to_end(&mut buf)?;
    let mut words = buf
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]));
    let mut dim = [0usize; 3];
    for d in dim.iter_mut() {
        *d = words
            .next()
            .and_then(|v| v.to_usize())
            .ok_or_else(|| SegError::ExternalTool("truncated output header".into()))?;
    }
    let shape = (dim[0], dim[1], dim[2]);
    if shape != expected {
        return Err(SegError::ExternalTool(format!(
            "output shape {shape:?}, expected {expected:?}"
        )));
    }
    let labels: Vec<u8> = words.map(|v| u8::from(v > 0)).collect();
    Array3::from_shape_vec(shape, labels)
        .map_err(|e| SegError::ExternalTool(format!("truncated output: {e}")))
}

impl RandomWalker {
    /// 按配置创建.
    pub fn new(cfg: &WalkerConfig) -> Self {
        Self::with_executable(&cfg.executable)
    }

    /// 指定可执行文件路径.
    pub fn with_executable<P: AsRef<Path>>(p: P) -> Self {
        Self {
            executable: p.as_ref().to_path_buf(),
        }
    }

    /// 可执行文件路径.
    #[inline]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// 外部程序是否存在.
    #[inline]
    pub fn is_available(&self) -> bool {
        self.executable.is_file()
    }

    /// 对子体运行随机游走. `seeds` 为局部坐标.
    ///
    /// 交换文件放在临时目录中, 返回前 (包括出错时) 自动删除.
    pub fn run_patch(&self, patch: ArrayView3<f32>, seeds: &SeedSet) -> SegResult<Array3<u8>> {
        if !self.is_available() {
            return Err(SegError::MissingExternalTool(self.executable.clone()));
        }
        let dir = tempfile::Builder::new().prefix("seg-berry-rw").tempdir()?;
        let data = dir.path().join("data.bin");
        let out = dir.path().join("out.bin");
        let points = dir.path().join("points.txt");

        {
            let mut w = BufWriter::new(File::create(&data)?);
            write_volume(&mut w, patch)?;
            w.flush()?;
            let mut w = BufWriter::new(File::create(&points)?);
            write_points(&mut w, patch.dim(), seeds)?;
            w.flush()?;
        }

        log::debug!("running {}", self.executable.display());
        let status = Command::new(&self.executable)
            .arg(&data)
            .arg(&out)
            .arg(&points)
            .current_dir(dir.path())
            .status()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => SegError::MissingExternalTool(self.executable.clone()),
                _ => SegError::Io(e),
            })?;
        log::info!("{} exited with {status}", self.executable.display());
        if !status.success() {
            return Err(SegError::ExternalTool(format!("exit status {status}")));
        }

        let f = File::open(&out)
            .map_err(|e| SegError::ExternalTool(format!("no output file: {e}")))?;
        read_labels(&mut BufReader::new(f), patch.dim())
    }
}

impl Segmenter for RandomWalker {
    fn segment(&mut self, volume: &Volume, bbox: &BBox, seeds: &SeedSet) -> SegResult<Array3<u8>> {
        seeds.require(1, 1)?;
        let t = Instant::now();
        let out = self.run_patch(volume.patch(bbox), &seeds.to_local(bbox))?;
        log::info!(
            "random walk on patch {:?} finished in {} ms",
            bbox.shape(),
            t.elapsed().as_millis()
        );
        Ok(out)
    }
}
