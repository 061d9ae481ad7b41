//! Raw interleaved-IQ file source and sink blocks covering the fourteen
//! wire sample formats and their offset/scale conversion to `Complex32`.

use sigflow_core::{Complex32, InitError, RuntimeContext, RuntimeError, SampleType};
use sigflow_graph::{Block, Port, ProcessResult, SampleBuf};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

/// The closed set of wire formats a raw-IQ file may hold. Unlike `Block`
/// dispatch, this set can never grow without changing the wire format
/// table itself, so it is a plain enum rather than a trait object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    S8,
    U8,
    S16Le,
    S16Be,
    U16Le,
    U16Be,
    S32Le,
    S32Be,
    U32Le,
    U32Be,
    F32Le,
    F32Be,
    F64Le,
    F64Be,
}

impl SampleFormat {
    /// Bytes occupied by one real component (half a complex sample).
    pub fn component_size(self) -> usize {
        match self {
            SampleFormat::S8 | SampleFormat::U8 => 1,
            SampleFormat::S16Le | SampleFormat::S16Be | SampleFormat::U16Le | SampleFormat::U16Be => 2,
            SampleFormat::S32Le | SampleFormat::S32Be | SampleFormat::U32Le | SampleFormat::U32Be => 4,
            SampleFormat::F32Le | SampleFormat::F32Be => 4,
            SampleFormat::F64Le | SampleFormat::F64Be => 8,
        }
    }

    fn decode(self, bytes: &[u8]) -> f32 {
        match self {
            SampleFormat::S8 => crate::codec::decode_i8(bytes[0] as i8),
            SampleFormat::U8 => crate::codec::decode_u8(bytes[0]),
            SampleFormat::S16Le => crate::codec::decode_i16(i16::from_le_bytes([bytes[0], bytes[1]])),
            SampleFormat::S16Be => crate::codec::decode_i16(i16::from_be_bytes([bytes[0], bytes[1]])),
            SampleFormat::U16Le => crate::codec::decode_u16(u16::from_le_bytes([bytes[0], bytes[1]])),
            SampleFormat::U16Be => crate::codec::decode_u16(u16::from_be_bytes([bytes[0], bytes[1]])),
            SampleFormat::S32Le => crate::codec::decode_i32(i32::from_le_bytes(bytes.try_into().unwrap())),
            SampleFormat::S32Be => crate::codec::decode_i32(i32::from_be_bytes(bytes.try_into().unwrap())),
            SampleFormat::U32Le => crate::codec::decode_u32(u32::from_le_bytes(bytes.try_into().unwrap())),
            SampleFormat::U32Be => crate::codec::decode_u32(u32::from_be_bytes(bytes.try_into().unwrap())),
            SampleFormat::F32Le => f32::from_le_bytes(bytes.try_into().unwrap()),
            SampleFormat::F32Be => f32::from_be_bytes(bytes.try_into().unwrap()),
            SampleFormat::F64Le => f64::from_le_bytes(bytes.try_into().unwrap()) as f32,
            SampleFormat::F64Be => f64::from_be_bytes(bytes.try_into().unwrap()) as f32,
        }
    }

    fn encode(self, x: f32, out: &mut Vec<u8>) {
        match self {
            SampleFormat::S8 => out.push(crate::codec::encode_i8(x) as u8),
            SampleFormat::U8 => out.push(crate::codec::encode_u8(x)),
            SampleFormat::S16Le => out.extend_from_slice(&crate::codec::encode_i16(x).to_le_bytes()),
            SampleFormat::S16Be => out.extend_from_slice(&crate::codec::encode_i16(x).to_be_bytes()),
            SampleFormat::U16Le => out.extend_from_slice(&crate::codec::encode_u16(x).to_le_bytes()),
            SampleFormat::U16Be => out.extend_from_slice(&crate::codec::encode_u16(x).to_be_bytes()),
            SampleFormat::S32Le => out.extend_from_slice(&crate::codec::encode_i32(x).to_le_bytes()),
            SampleFormat::S32Be => out.extend_from_slice(&crate::codec::encode_i32(x).to_be_bytes()),
            SampleFormat::U32Le => out.extend_from_slice(&crate::codec::encode_u32(x).to_le_bytes()),
            SampleFormat::U32Be => out.extend_from_slice(&crate::codec::encode_u32(x).to_be_bytes()),
            SampleFormat::F32Le => out.extend_from_slice(&x.to_le_bytes()),
            SampleFormat::F32Be => out.extend_from_slice(&x.to_be_bytes()),
            SampleFormat::F64Le => out.extend_from_slice(&(x as f64).to_le_bytes()),
            SampleFormat::F64Be => out.extend_from_slice(&(x as f64).to_be_bytes()),
        }
    }
}

const CHUNK_SAMPLES: usize = 8192;

/// Reads interleaved I/Q component pairs from a raw binary file and emits
/// them as `Complex32` on a single output port.
pub struct IqSource {
    path: PathBuf,
    format: SampleFormat,
    sample_rate: f64,
    reader: Option<BufReader<File>>,
    ports_out: Vec<Port>,
}

impl IqSource {
    pub fn new(path: impl Into<PathBuf>, format: SampleFormat, sample_rate: f64) -> Self {
        Self {
            path: path.into(),
            format,
            sample_rate,
            reader: None,
            ports_out: vec![Port::output("out1", SampleType::Complex32)],
        }
    }
}

impl Block for IqSource {
    fn inputs(&self) -> &[Port] {
        &[]
    }

    fn outputs(&self) -> &[Port] {
        &self.ports_out
    }

    fn initialize(&mut self, _ctx: &RuntimeContext) -> Result<(), InitError> {
        let file = File::open(&self.path).map_err(|e| {
            log::error!("iq_source: failed to open {}: {e}", self.path.display());
            InitError::DeviceUnavailable(e.to_string())
        })?;
        self.reader = Some(BufReader::new(file));
        Ok(())
    }

    fn set_rate(&mut self, _input_rates: &[f64]) -> Vec<f64> {
        vec![self.sample_rate]
    }

    fn process(&mut self, _inputs: &[SampleBuf], outputs: &mut [SampleBuf]) -> Result<ProcessResult, RuntimeError> {
        let component_size = self.format.component_size();
        let frame_size = component_size * 2;
        let capacity = outputs[0].len().min(CHUNK_SAMPLES);

        let mut raw = vec![0u8; capacity * frame_size];
        let reader = self.reader.as_mut().expect("initialize must run before process");
        let read = reader.read(&mut raw).map_err(|e| {
            log::error!("iq_source: {} read failed: {e}", self.path.display());
            e
        })?;
        let complete_frames = read / frame_size;

        if complete_frames == 0 {
            return Ok(ProcessResult::EndOfStream);
        }

        let mut samples = Vec::with_capacity(complete_frames);
        for frame in raw[..complete_frames * frame_size].chunks_exact(frame_size) {
            let re = self.format.decode(&frame[..component_size]);
            let im = self.format.decode(&frame[component_size..]);
            samples.push(Complex32::new(re, im));
        }

        if let SampleBuf::Complex32(out) = &mut outputs[0] {
            out[..samples.len()].copy_from_slice(&samples);
        }

        Ok(ProcessResult::samples(vec![], vec![samples.len()]))
    }

    fn name(&self) -> &str {
        "iq_source"
    }
}

/// Writes `Complex32` input as interleaved I/Q component pairs to a raw
/// binary file.
pub struct IqSink {
    path: PathBuf,
    format: SampleFormat,
    writer: Option<BufWriter<File>>,
    ports_in: Vec<Port>,
}

impl IqSink {
    pub fn new(path: impl Into<PathBuf>, format: SampleFormat) -> Self {
        Self {
            path: path.into(),
            format,
            writer: None,
            ports_in: vec![Port::input("in1", SampleType::Complex32)],
        }
    }
}

impl Block for IqSink {
    fn inputs(&self) -> &[Port] {
        &self.ports_in
    }

    fn outputs(&self) -> &[Port] {
        &[]
    }

    fn initialize(&mut self, _ctx: &RuntimeContext) -> Result<(), InitError> {
        let file = File::create(&self.path).map_err(|e| {
            log::error!("iq_sink: failed to create {}: {e}", self.path.display());
            InitError::DeviceUnavailable(e.to_string())
        })?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn set_rate(&mut self, _input_rates: &[f64]) -> Vec<f64> {
        vec![]
    }

    fn process(&mut self, inputs: &[SampleBuf], _outputs: &mut [SampleBuf]) -> Result<ProcessResult, RuntimeError> {
        let samples = inputs[0].as_complex32();
        let mut raw = Vec::with_capacity(samples.len() * self.format.component_size() * 2);
        for s in samples {
            self.format.encode(s.re, &mut raw);
            self.format.encode(s.im, &mut raw);
        }

        let w = self.writer.as_mut().expect("initialize must run before process");
        w.write_all(&raw).map_err(|e| {
            log::error!("iq_sink: {} write failed: {e}", self.path.display());
            e
        })?;

        Ok(ProcessResult::samples(vec![samples.len()], vec![]))
    }

    fn deinitialize(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
    }

    fn name(&self) -> &str {
        "iq_sink"
    }
}
