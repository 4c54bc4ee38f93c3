mod audio;

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

pub use audio::StemAudio;

/// File extensions the decoder is built to handle.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "ogg"];

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
}

/// Turn a stem URL into a path on disk.
///
/// Accepts plain paths and `file://` URLs. Relative paths are tried as-is,
/// then under `root` (the configured stems directory).
pub fn resolve_stem_path(url: &str, root: Option<&Path>) -> Option<PathBuf> {
    let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
    if path.exists() {
        return Some(path.to_path_buf());
    }
    if path.is_relative() {
        let under_root = root?.join(path);
        if under_root.exists() {
            return Some(under_root);
        }
    }
    None
}

/// Resolve and decode a stem URL.
pub fn decode_stem(url: &str, root: Option<&Path>) -> anyhow::Result<StemAudio> {
    let path =
        resolve_stem_path(url, root).ok_or_else(|| anyhow::anyhow!("stem not found: {url}"))?;
    decode_file(&path)
}

/// Decode a whole file to interleaved `f32`.
///
/// Packets the codec rejects are skipped; anything else is an error.
pub fn decode_file(path: &Path) -> anyhow::Result<StemAudio> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow::anyhow!("no audio track in {}", path.display()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    let mut skipped = 0usize;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) => {
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        channels.get_or_insert(spec.channels.count() as u16);

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if skipped > 0 {
        tracing::warn!(path = %path.display(), skipped, "Skipped undecodable packets");
    }

    let audio = StemAudio::new(samples, sample_rate.unwrap_or(44100), channels.unwrap_or(2))?;
    tracing::debug!(
        path = %path.display(),
        frames = audio.frames(),
        sample_rate = audio.sample_rate(),
        channels = audio.channels(),
        "Decoded stem"
    );
    Ok(audio)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames * channels as usize {
            let value = ((i % 100) as i16 - 50) * 200;
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_wav_reports_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocals.wav");
        write_wav(&path, 22050, 2, 22050);

        let audio = decode_file(&path).unwrap();
        assert_eq!(audio.sample_rate(), 22050);
        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.frames(), 22050);
        assert!((audio.duration_secs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(decode_file(&dir.path().join("nope.wav")).is_err());
        assert!(decode_stem("nope.wav", Some(dir.path())).is_err());
    }

    #[test]
    fn test_decode_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drums.wav");
        std::fs::write(&path, b"definitely not audio").unwrap();
        assert!(decode_file(&path).is_err());
    }

    #[test]
    fn test_resolve_handles_file_urls_and_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bass.wav");
        write_wav(&path, 8000, 1, 10);

        let url = format!("file://{}", path.display());
        assert_eq!(resolve_stem_path(&url, None), Some(path.clone()));
        assert_eq!(resolve_stem_path("bass.wav", Some(dir.path())), Some(path));
        assert_eq!(resolve_stem_path("bass.wav", None), None);
        assert_eq!(resolve_stem_path("piano.wav", Some(dir.path())), None);
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported(Path::new("song/Vocals.MP3")));
        assert!(is_supported(Path::new("drums.flac")));
        assert!(!is_supported(Path::new("notes.txt")));
        assert!(!is_supported(Path::new("no_extension")));
    }
}
