//! Elementary stream PID registration.

use log::debug;
use tvcard_protocol::ProgramDecodeRequest;

use crate::ts_analyzer::{descriptor_tag, stream_type, PmtStream, PmtTable};

use super::Registration;

/// Single-PID category a stream can fill in the program record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCategory {
    Video,
    Audio,
    Ac3Audio,
    Teletext,
}

/// Classify a stream by stream type or primary descriptor tag.
///
/// Categories are checked in priority order, so a stream matching the video
/// rule is never considered audio.
pub fn classify_stream(stream: &PmtStream) -> Option<StreamCategory> {
    let st = stream.stream_type;
    let tag = stream.primary_descriptor_tag();
    let tag_in = |tags: &[u8]| tag.map_or(false, |t| tags.contains(&t));

    if matches!(
        st,
        stream_type::MPEG1_VIDEO
            | stream_type::MPEG2_VIDEO
            | stream_type::MPEG4_VIDEO
            | stream_type::H264_VIDEO
    ) || tag_in(&[
        descriptor_tag::VIDEO_STREAM,
        descriptor_tag::MPEG4_VIDEO,
        descriptor_tag::AVC_VIDEO,
    ]) {
        Some(StreamCategory::Video)
    } else if matches!(
        st,
        stream_type::MPEG1_AUDIO
            | stream_type::MPEG2_AUDIO
            | stream_type::MPEG2_AAC_AUDIO
            | stream_type::MPEG4_AUDIO
    ) || tag_in(&[
        descriptor_tag::AUDIO_STREAM,
        descriptor_tag::MPEG4_AUDIO,
        descriptor_tag::MPEG2_AAC_AUDIO,
        descriptor_tag::AAC,
    ]) {
        Some(StreamCategory::Audio)
    } else if matches!(st, stream_type::AC3_AUDIO | stream_type::ENHANCED_AC3_AUDIO)
        || tag_in(&[
            descriptor_tag::AC3,
            descriptor_tag::AC3_AUDIO,
            descriptor_tag::ENHANCED_AC3,
        ])
    {
        Some(StreamCategory::Ac3Audio)
    } else if tag_in(&[descriptor_tag::TELETEXT, descriptor_tag::VBI_TELETEXT]) {
        Some(StreamCategory::Teletext)
    } else {
        None
    }
}

/// Fill the PID list and the named PID fields of `request` from the PMT.
///
/// Every stream PID goes into the PID list while it has room. The first
/// stream of each category sets the matching field; later ones never
/// overwrite it.
pub fn register_video_and_audio_pids(
    pmt: &PmtTable,
    request: &mut ProgramDecodeRequest,
) -> Registration {
    debug!("Registering video and audio PIDs");
    request.service_id = pmt.program_number;
    request.pcr_pid = pmt.pcr_pid;

    let mut truncated = false;
    for stream in &pmt.streams {
        if request.pids.push(stream.elementary_pid).is_err() && !truncated {
            debug!("PID list full, unable to register all PIDs");
            truncated = true;
        }

        let field = match classify_stream(stream) {
            Some(StreamCategory::Video) => &mut request.video_pid,
            Some(StreamCategory::Audio) => &mut request.audio_pid,
            Some(StreamCategory::Ac3Audio) => &mut request.ac3_audio_pid,
            Some(StreamCategory::Teletext) => &mut request.teletext_pid,
            None => continue,
        };
        if *field == 0 {
            *field = stream.elementary_pid;
        }
    }

    Registration {
        count: request.pids.len(),
        truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts_analyzer::Descriptor;

    fn stream(stream_type: u8, pid: u16, tags: &[u8]) -> PmtStream {
        PmtStream {
            stream_type,
            elementary_pid: pid,
            descriptors: tags
                .iter()
                .map(|&tag| Descriptor { tag, data: vec![] })
                .collect(),
        }
    }

    fn pmt(streams: Vec<PmtStream>) -> PmtTable {
        PmtTable {
            program_number: 0x2B66,
            version_number: 0,
            pcr_pid: 0x00FF,
            program_info: vec![],
            streams,
        }
    }

    #[test]
    fn test_classify_by_type_and_tag() {
        assert_eq!(
            classify_stream(&stream(stream_type::H264_VIDEO, 1, &[])),
            Some(StreamCategory::Video)
        );
        assert_eq!(
            classify_stream(&stream(stream_type::PES_PRIVATE_DATA, 1, &[0x0A, descriptor_tag::AAC])),
            Some(StreamCategory::Audio)
        );
        assert_eq!(
            classify_stream(&stream(stream_type::ENHANCED_AC3_AUDIO, 1, &[])),
            Some(StreamCategory::Ac3Audio)
        );
        assert_eq!(
            classify_stream(&stream(stream_type::PES_PRIVATE_DATA, 1, &[descriptor_tag::TELETEXT])),
            Some(StreamCategory::Teletext)
        );
        // Only the primary descriptor counts.
        assert_eq!(
            classify_stream(&stream(
                stream_type::PES_PRIVATE_DATA,
                1,
                &[descriptor_tag::AC3, descriptor_tag::TELETEXT]
            )),
            Some(StreamCategory::Ac3Audio)
        );
        assert_eq!(classify_stream(&stream(0x05, 1, &[0x52])), None);
    }

    #[test]
    fn test_first_match_wins() {
        let pmt = pmt(vec![
            stream(stream_type::MPEG2_VIDEO, 0x00FF, &[]),
            stream(stream_type::MPEG1_AUDIO, 0x0100, &[]),
            stream(stream_type::MPEG1_AUDIO, 0x0101, &[]),
            stream(stream_type::PES_PRIVATE_DATA, 0x0102, &[descriptor_tag::AC3]),
            stream(stream_type::PES_PRIVATE_DATA, 0x0020, &[descriptor_tag::TELETEXT]),
            stream(stream_type::H264_VIDEO, 0x0200, &[]),
        ]);
        let mut request = ProgramDecodeRequest::default();
        let registration = register_video_and_audio_pids(&pmt, &mut request);

        assert_eq!(registration, Registration { count: 6, truncated: false });
        assert_eq!(request.service_id, 0x2B66);
        assert_eq!(request.pcr_pid, 0x00FF);
        assert_eq!(request.video_pid, 0x00FF);
        assert_eq!(request.audio_pid, 0x0100);
        assert_eq!(request.ac3_audio_pid, 0x0102);
        assert_eq!(request.teletext_pid, 0x0020);
        assert_eq!(request.pids.as_slice()[5], 0x0200);
    }

    #[test]
    fn test_pid_list_cap() {
        let mut streams: Vec<PmtStream> = (0..70)
            .map(|i| stream(stream_type::PES_PRIVATE_DATA, 0x0300 + i, &[]))
            .collect();
        streams.push(stream(stream_type::MPEG2_VIDEO, 0x0100, &[]));
        let mut request = ProgramDecodeRequest::default();
        let registration = register_video_and_audio_pids(&pmt(streams), &mut request);

        assert_eq!(registration, Registration { count: 63, truncated: true });
        assert_eq!(request.pids.len(), 63);
        // Classification continues past the full list.
        assert_eq!(request.video_pid, 0x0100);
    }

    #[test]
    fn test_categories_filled_after_list_is_full() {
        let mut streams: Vec<PmtStream> = (0..63)
            .map(|i| stream(stream_type::PES_PRIVATE_DATA, 0x0300 + i, &[]))
            .collect();
        streams.push(stream(stream_type::MPEG2_AUDIO, 0x0101, &[]));
        streams.push(stream(stream_type::AC3_AUDIO, 0x0102, &[]));
        streams.push(stream(stream_type::PES_PRIVATE_DATA, 0x0103, &[descriptor_tag::TELETEXT]));
        let mut request = ProgramDecodeRequest::default();
        let registration = register_video_and_audio_pids(&pmt(streams), &mut request);

        assert_eq!(registration, Registration { count: 63, truncated: true });
        assert!(!request.pids.as_slice().contains(&0x0101));
        assert_eq!(request.video_pid, 0);
        assert_eq!(request.audio_pid, 0x0101);
        assert_eq!(request.ac3_audio_pid, 0x0102);
        assert_eq!(request.teletext_pid, 0x0103);
    }
}
