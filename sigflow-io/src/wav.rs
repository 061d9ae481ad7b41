//! WAV file source and sink blocks: hand-rolled RIFF parsing so header
//! corruption maps to specific `InitError` variants rather than a single
//! opaque I/O failure.

use sigflow_core::{InitError, RuntimeContext, RuntimeError, SampleType};
use sigflow_graph::{Block, Port, ProcessResult, SampleBuf};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

const CHUNK_FRAMES: usize = 4096;

fn read_exact_or_invalid<R: Read>(r: &mut R, buf: &mut [u8], what: &str) -> Result<(), InitError> {
    r.read_exact(buf).map_err(|_| InitError::InvalidHeader(format!("truncated while reading {what}")))
}

fn read_tag<R: Read>(r: &mut R, expected: &[u8; 4]) -> Result<(), InitError> {
    let mut tag = [0u8; 4];
    read_exact_or_invalid(r, &mut tag, "a four-byte tag")?;
    if &tag != expected {
        return Err(InitError::InvalidHeader(format!(
            "expected tag {:?}, found {:?}",
            std::str::from_utf8(expected).unwrap_or("?"),
            String::from_utf8_lossy(&tag),
        )));
    }
    Ok(())
}

fn read_u32_le<R: Read>(r: &mut R) -> Result<u32, InitError> {
    let mut buf = [0u8; 4];
    read_exact_or_invalid(r, &mut buf, "a u32")?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u16_le<R: Read>(r: &mut R) -> Result<u16, InitError> {
    let mut buf = [0u8; 2];
    read_exact_or_invalid(r, &mut buf, "a u16")?;
    Ok(u16::from_le_bytes(buf))
}

struct FmtChunk {
    audio_format: u16,
    num_channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// Scans chunks after `WAVE` until `fmt ` and `data` have both been seen,
/// skipping (and word-aligning past) anything else. Returns the parsed
/// `fmt ` chunk and the byte length of the `data` chunk, with the reader
/// left positioned at the first PCM byte.
fn parse_riff_header<R: Read + Seek>(r: &mut R) -> Result<(FmtChunk, u32), InitError> {
    read_tag(r, b"RIFF")?;
    let _riff_size = read_u32_le(r)?;
    read_tag(r, b"WAVE")?;

    let mut fmt: Option<FmtChunk> = None;
    loop {
        let mut id = [0u8; 4];
        if r.read_exact(&mut id).is_err() {
            return Err(InitError::InvalidHeader("reached end of file before a data chunk".into()));
        }
        let size = read_u32_le(r)?;

        if &id == b"fmt " {
            let audio_format = read_u16_le(r)?;
            let num_channels = read_u16_le(r)?;
            let sample_rate = read_u32_le(r)?;
            let _byte_rate = read_u32_le(r)?;
            let _block_align = read_u16_le(r)?;
            let bits_per_sample = read_u16_le(r)?;
            if audio_format != 1 {
                return Err(InitError::UnsupportedAudioFormat(audio_format));
            }
            if !matches!(bits_per_sample, 8 | 16 | 32) {
                return Err(InitError::UnsupportedBitsPerSample(bits_per_sample));
            }
            let consumed = 16u32;
            if size > consumed {
                r.seek(SeekFrom::Current((size - consumed) as i64))
                    .map_err(|e| InitError::InvalidHeader(format!("seeking past fmt extension: {e}")))?;
            } else if size < consumed {
                return Err(InitError::InvalidHeader("fmt chunk shorter than required 16 bytes".into()));
            }
            fmt = Some(FmtChunk { audio_format, num_channels, sample_rate, bits_per_sample });
        } else if &id == b"data" {
            let fmt = fmt.ok_or_else(|| InitError::InvalidHeader("data chunk appeared before fmt chunk".into()))?;
            return Ok((fmt, size));
        } else {
            r.seek(SeekFrom::Current(size as i64))
                .map_err(|e| InitError::InvalidHeader(format!("seeking past unknown chunk '{}': {e}", String::from_utf8_lossy(&id))))?;
        }

        if size % 2 == 1 {
            r.seek(SeekFrom::Current(1))
                .map_err(|e| InitError::InvalidHeader(format!("seeking past chunk padding: {e}")))?;
        }
    }
}

fn decode_frame(bytes: &[u8], bits_per_sample: u16, num_channels: usize, out: &mut [Vec<f32>]) {
    let bytes_per_sample = (bits_per_sample / 8) as usize;
    for ch in 0..num_channels {
        let start = ch * bytes_per_sample;
        let sample = &bytes[start..start + bytes_per_sample];
        let x = match bits_per_sample {
            8 => crate::codec::decode_u8(sample[0]),
            16 => crate::codec::decode_i16(i16::from_le_bytes([sample[0], sample[1]])),
            32 => crate::codec::decode_i32(i32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]])),
            _ => unreachable!("bits_per_sample validated at parse time"),
        };
        out[ch].push(x);
    }
}

fn encode_frame(samples: &[f32], bits_per_sample: u16, out: &mut Vec<u8>) {
    for &x in samples {
        match bits_per_sample {
            8 => out.push(crate::codec::encode_u8(x)),
            16 => out.extend_from_slice(&crate::codec::encode_i16(x).to_le_bytes()),
            32 => out.extend_from_slice(&crate::codec::encode_i32(x).to_le_bytes()),
            _ => unreachable!("bits_per_sample validated at construction time"),
        }
    }
}

/// Reads interleaved PCM from a `.wav` file, one `Real32` output port per
/// channel. The channel count is fixed at construction time, matching the
/// rule that a block's ports never change after construction; if the
/// file's actual channel count disagrees, `initialize` fails with
/// `NumChannelsMismatch` rather than silently adapting.
pub struct WavSource {
    path: PathBuf,
    ports_out: Vec<Port>,
    reader: Option<BufReader<File>>,
    bits_per_sample: u16,
    sample_rate: u32,
    bytes_remaining: u32,
}

impl WavSource {
    pub fn new(path: impl Into<PathBuf>, expected_channels: usize) -> Self {
        let ports_out = (0..expected_channels)
            .map(|i| Port::output(format!("out{}", i + 1), SampleType::Real32))
            .collect();
        Self {
            path: path.into(),
            ports_out,
            reader: None,
            bits_per_sample: 0,
            sample_rate: 0,
            bytes_remaining: 0,
        }
    }
}

impl Block for WavSource {
    fn inputs(&self) -> &[Port] {
        &[]
    }

    fn outputs(&self) -> &[Port] {
        &self.ports_out
    }

    fn initialize(&mut self, _ctx: &RuntimeContext) -> Result<(), InitError> {
        let file = File::open(&self.path).map_err(|e| {
            log::error!("wav_source: failed to open {}: {e}", self.path.display());
            InitError::DeviceUnavailable(e.to_string())
        })?;
        let mut reader = BufReader::new(file);
        let (fmt, data_size) = parse_riff_header(&mut reader).map_err(|e| {
            log::warn!("wav_source: {} failed header validation: {e}", self.path.display());
            e
        })?;

        let expected = self.ports_out.len();
        if fmt.num_channels as usize != expected {
            return Err(InitError::NumChannelsMismatch { expected, found: fmt.num_channels as usize });
        }

        self.bits_per_sample = fmt.bits_per_sample;
        self.sample_rate = fmt.sample_rate;
        self.bytes_remaining = data_size;
        self.reader = Some(reader);
        Ok(())
    }

    fn set_rate(&mut self, _input_rates: &[f64]) -> Vec<f64> {
        vec![self.sample_rate as f64; self.ports_out.len()]
    }

    fn process(&mut self, _inputs: &[SampleBuf], outputs: &mut [SampleBuf]) -> Result<ProcessResult, RuntimeError> {
        if self.bytes_remaining == 0 {
            return Ok(ProcessResult::EndOfStream);
        }

        let num_channels = self.ports_out.len();
        let bytes_per_frame = num_channels * (self.bits_per_sample / 8) as usize;
        let capacity = outputs[0].len().min(CHUNK_FRAMES);
        let frames_available = (self.bytes_remaining as usize) / bytes_per_frame;
        let frames = capacity.min(frames_available);

        if frames == 0 {
            return Ok(ProcessResult::EndOfStream);
        }

        let mut raw = vec![0u8; frames * bytes_per_frame];
        let reader = self.reader.as_mut().expect("initialize must run before process");
        reader.read_exact(&mut raw).map_err(|e| {
            log::error!("wav_source: {} read failed: {e}", self.path.display());
            e
        })?;
        self.bytes_remaining -= raw.len() as u32;

        let mut channels: Vec<Vec<f32>> = vec![Vec::with_capacity(frames); num_channels];
        for frame in raw.chunks_exact(bytes_per_frame) {
            decode_frame(frame, self.bits_per_sample, num_channels, &mut channels);
        }

        for (ch, samples) in channels.into_iter().enumerate() {
            let n = samples.len();
            if let SampleBuf::Real32(out) = &mut outputs[ch] {
                out[..n].copy_from_slice(&samples);
            }
        }

        Ok(ProcessResult::samples(vec![], vec![frames; num_channels]))
    }

    fn name(&self) -> &str {
        "wav_source"
    }
}

/// Writes interleaved PCM to a `.wav` file, one `Real32` input port per
/// channel. The sample rate is only known once rate propagation runs
/// (after `initialize`), so the header is deferred and written on the
/// first `process` call, once `set_rate` has supplied it; the RIFF and
/// data chunk sizes are patched in on `deinitialize`, mirroring a
/// streaming WAV writer's finalize step.
pub struct WavSink {
    path: PathBuf,
    ports_in: Vec<Port>,
    bits_per_sample: u16,
    sample_rate: u32,
    writer: Option<BufWriter<File>>,
    header_written: bool,
    data_bytes_written: u32,
}

impl WavSink {
    pub fn new(path: impl Into<PathBuf>, num_channels: usize, bits_per_sample: u16) -> Self {
        assert!(matches!(bits_per_sample, 8 | 16 | 32), "bits_per_sample must be 8, 16, or 32");
        let ports_in = (0..num_channels)
            .map(|i| Port::input(format!("in{}", i + 1), SampleType::Real32))
            .collect();
        Self {
            path: path.into(),
            ports_in,
            bits_per_sample,
            sample_rate: 0,
            writer: None,
            header_written: false,
            data_bytes_written: 0,
        }
    }

    fn write_header(&mut self) -> Result<(), RuntimeError> {
        let num_channels = self.ports_in.len() as u16;
        let bytes_per_sample = self.bits_per_sample / 8;
        let block_align = num_channels * bytes_per_sample;
        let byte_rate = self.sample_rate * block_align as u32;

        let w = self.writer.as_mut().expect("initialize must run before process");
        w.write_all(b"RIFF")?;
        w.write_all(&0u32.to_le_bytes())?; // patched on deinitialize
        w.write_all(b"WAVE")?;
        w.write_all(b"fmt ")?;
        w.write_all(&16u32.to_le_bytes())?;
        w.write_all(&1u16.to_le_bytes())?; // PCM
        w.write_all(&num_channels.to_le_bytes())?;
        w.write_all(&self.sample_rate.to_le_bytes())?;
        w.write_all(&byte_rate.to_le_bytes())?;
        w.write_all(&block_align.to_le_bytes())?;
        w.write_all(&self.bits_per_sample.to_le_bytes())?;
        w.write_all(b"data")?;
        w.write_all(&0u32.to_le_bytes())?; // patched on deinitialize
        self.header_written = true;
        Ok(())
    }
}

impl Block for WavSink {
    fn inputs(&self) -> &[Port] {
        &self.ports_in
    }

    fn outputs(&self) -> &[Port] {
        &[]
    }

    fn initialize(&mut self, _ctx: &RuntimeContext) -> Result<(), InitError> {
        let file = File::create(&self.path).map_err(|e| {
            log::error!("wav_sink: failed to create {}: {e}", self.path.display());
            InitError::DeviceUnavailable(e.to_string())
        })?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn set_rate(&mut self, input_rates: &[f64]) -> Vec<f64> {
        self.sample_rate = input_rates.first().copied().unwrap_or(0.0) as u32;
        vec![]
    }

    fn process(&mut self, inputs: &[SampleBuf], _outputs: &mut [SampleBuf]) -> Result<ProcessResult, RuntimeError> {
        if !self.header_written {
            self.write_header()?;
        }

        let num_channels = self.ports_in.len();
        let n = inputs.iter().map(|b| b.len()).min().unwrap_or(0);
        if n == 0 {
            return Ok(ProcessResult::samples(vec![0; num_channels], vec![]));
        }

        let mut raw = Vec::with_capacity(n * num_channels * (self.bits_per_sample / 8) as usize);
        for frame in 0..n {
            let frame_samples: Vec<f32> = inputs.iter().map(|b| b.as_real32()[frame]).collect();
            encode_frame(&frame_samples, self.bits_per_sample, &mut raw);
        }

        let w = self.writer.as_mut().expect("initialize must run before process");
        w.write_all(&raw).map_err(|e| {
            log::error!("wav_sink: {} write failed: {e}", self.path.display());
            e
        })?;
        self.data_bytes_written += raw.len() as u32;

        Ok(ProcessResult::samples(vec![n; num_channels], vec![]))
    }

    fn deinitialize(&mut self) {
        let Some(w) = self.writer.as_mut() else { return };
        if !self.header_written {
            return;
        }
        let _ = w.flush();
        let Ok(file) = w.get_mut().try_clone() else { return };
        let mut file = file;
        let riff_size = 36 + self.data_bytes_written;
        if file.seek(SeekFrom::Start(4)).is_ok() {
            let _ = file.write_all(&riff_size.to_le_bytes());
        }
        if file.seek(SeekFrom::Start(40)).is_ok() {
            let _ = file.write_all(&self.data_bytes_written.to_le_bytes());
        }
    }

    fn name(&self) -> &str {
        "wav_sink"
    }
}
