#![cfg(target_os = "linux")]

//! Tests against card 0 / device 0. Marked `#[ignore]` because they need a
//! real sound card and cannot run in headless CI.

#[cfg(test)]
mod tests {
    use pcmio::device;
    use pcmio::{Direction, Pcm, PcmFlags, PcmFormat, PcmParam, StreamConfig};

    fn scenario_config() -> StreamConfig {
        StreamConfig {
            channels: 2,
            rate: 48000,
            period_size: 1024,
            period_count: 3,
            format: PcmFormat::S16Le,
            ..StreamConfig::default()
        }
    }

    #[test]
    #[ignore = "requires ALSA hardware"]
    fn test_playback_five_periods_of_silence() {
        let config = scenario_config();
        let mut pcm = Pcm::open(0, 0, PcmFlags::empty(), &config);
        assert!(pcm.is_ready(), "open failed: {}", pcm.error());

        let silence = vec![0_u8; pcm.frames_to_bytes(1024)];
        for _ in 0..5 {
            let frames = pcm.writei(&silence, 1024).expect("write failed");
            assert_eq!(frames, 1024);
        }
        assert_eq!(pcm.underruns(), 0);
        pcm.drain().expect("drain failed");
    }

    #[test]
    #[ignore = "requires ALSA hardware"]
    fn test_open_close_cycles() {
        let config = scenario_config();
        for _ in 0..50 {
            let pcm = Pcm::open(0, 0, PcmFlags::empty(), &config);
            assert!(pcm.is_ready(), "open failed: {}", pcm.error());
            assert_eq!(
                pcm.buffer_size(),
                u64::from(pcm.config().period_size) * u64::from(pcm.config().period_count)
            );
            assert!(pcm.config().period_size >= config.period_size);
            pcm.close();
        }
    }

    #[test]
    #[ignore = "requires ALSA hardware"]
    fn test_fresh_stream_availability() {
        let config = scenario_config();
        let mut playback = Pcm::open(0, 0, PcmFlags::empty(), &config);
        assert!(playback.is_ready(), "open failed: {}", playback.error());
        playback.prepare().expect("prepare failed");
        assert_eq!(playback.available().expect("avail"), playback.buffer_size());
        drop(playback);

        let mut capture = Pcm::open(0, 0, PcmFlags::IN, &config);
        if capture.is_ready() {
            capture.prepare().expect("prepare failed");
            assert_eq!(capture.available().expect("avail"), 0);
        }
    }

    #[test]
    #[ignore = "requires ALSA hardware"]
    fn test_mmap_playback() {
        let config = scenario_config();
        let mut pcm = Pcm::open(0, 0, PcmFlags::MMAP, &config);
        assert!(pcm.is_ready(), "open failed: {}", pcm.error());
        let silence = vec![0_u8; pcm.frames_to_bytes(4096)];
        assert_eq!(pcm.mmap_write(&silence, 4096).expect("mmap write"), 4096);
        pcm.stop().expect("stop failed");
    }

    #[test]
    #[ignore = "requires ALSA hardware"]
    fn test_capabilities() {
        let params = device::get_params(0, 0, Direction::Playback);
        assert!(params.is_some(), "card 0 device 0 has no playback node");
        let params = params.as_ref();
        let min = device::get_min(params, PcmParam::Rate);
        let max = device::get_max(params, PcmParam::Rate);
        assert!(min > 0 && min <= max);
        assert!(device::get_mask(params, PcmParam::Format).is_some());
        let nodes = device::list_pcm_nodes().expect("list nodes");
        assert!(nodes.iter().any(|n| n.card == 0 && n.device == 0));
    }
}
