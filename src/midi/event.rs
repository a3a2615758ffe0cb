// MIDI channel-voice events
// Channel-voice messages decoded from input and encoded for output devices

/// Controller number for "All Notes Off"
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// Controller number for "Reset All Controllers"
pub const CC_RESET_ALL_CONTROLLERS: u8 = 121;

/// Pitch bend range (signed 14-bit)
pub const PITCH_BEND_MIN: i16 = -8192;
pub const PITCH_BEND_MAX: i16 = 8191;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    /// Signed pitch bend, 0 = centered
    PitchBend { channel: u8, value: i16 },
    ProgramChange { channel: u8, program: u8 },
}

impl MidiEvent {
    /// Decode a channel-voice message; `None` for short, system or unknown messages
    ///
    /// Data bytes are masked to 7 bits. A Note On with velocity 0 decodes as Note Off.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;
        let channel = status & 0x0F;
        let data_at = |i: usize| data.get(i).map(|b| b & 0x7F);

        let event = match status & 0xF0 {
            0x80 => MidiEvent::NoteOff {
                channel,
                note: data_at(0)?,
            },
            0x90 => {
                let (note, velocity) = (data_at(0)?, data_at(1)?);
                if velocity == 0 {
                    MidiEvent::NoteOff { channel, note }
                } else {
                    MidiEvent::NoteOn {
                        channel,
                        note,
                        velocity,
                    }
                }
            }
            0xB0 => MidiEvent::ControlChange {
                channel,
                controller: data_at(0)?,
                value: data_at(1)?,
            },
            0xC0 => MidiEvent::ProgramChange {
                channel,
                program: data_at(0)?,
            },
            0xE0 => {
                let raw = ((data_at(1)? as i16) << 7) | data_at(0)? as i16;
                MidiEvent::PitchBend {
                    channel,
                    value: raw - 8192,
                }
            }
            _ => return None,
        };
        Some(event)
    }

    /// Encode to wire bytes. Data fields are clamped to their legal range.
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => vec![0x90 | clamp_channel(channel), clamp_data(note), clamp_data(velocity)],
            MidiEvent::NoteOff { channel, note } => {
                vec![0x80 | clamp_channel(channel), clamp_data(note), 0]
            }
            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } => vec![0xB0 | clamp_channel(channel), clamp_data(controller), clamp_data(value)],
            MidiEvent::PitchBend { channel, value } => {
                let (lsb, msb) = split_pitch_bend(value);
                vec![0xE0 | clamp_channel(channel), lsb, msb]
            }
            MidiEvent::ProgramChange { channel, program } => {
                vec![0xC0 | clamp_channel(channel), clamp_data(program)]
            }
        }
    }

    /// MIDI channel (0-15)
    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::PitchBend { channel, .. }
            | MidiEvent::ProgramChange { channel, .. } => channel,
        }
    }

    /// Same message on another channel
    pub fn with_channel(mut self, new_channel: u8) -> Self {
        let new_channel = clamp_channel(new_channel);
        match &mut self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::PitchBend { channel, .. }
            | MidiEvent::ProgramChange { channel, .. } => *channel = new_channel,
        }
        self
    }
}

/// Clamp a data byte to 0..=127
pub fn clamp_data(value: u8) -> u8 {
    value.min(127)
}

/// Clamp a channel to 0..=15
pub fn clamp_channel(channel: u8) -> u8 {
    channel.min(15)
}

/// Split a signed pitch bend into 7-bit (LSB, MSB)
pub fn split_pitch_bend(value: i16) -> (u8, u8) {
    let unsigned = (value.clamp(PITCH_BEND_MIN, PITCH_BEND_MAX) as i32 + 8192) as u16;
    ((unsigned & 0x7F) as u8, ((unsigned >> 7) & 0x7F) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_note_messages() {
        assert_eq!(
            MidiEvent::from_bytes(&[0x90, 60, 100]),
            Some(MidiEvent::NoteOn {
                channel: 0,
                note: 60,
                velocity: 100
            })
        );
        assert_eq!(
            MidiEvent::from_bytes(&[0x83, 60, 0]),
            Some(MidiEvent::NoteOff { channel: 3, note: 60 })
        );
        // Running-status style release
        assert_eq!(
            MidiEvent::from_bytes(&[0x90, 64, 0]),
            Some(MidiEvent::NoteOff { channel: 0, note: 64 })
        );
        // Release velocity is not required
        assert_eq!(
            MidiEvent::from_bytes(&[0x81, 40]),
            Some(MidiEvent::NoteOff { channel: 1, note: 40 })
        );
    }

    #[test]
    fn test_decode_controller_masks_data() {
        assert_eq!(
            MidiEvent::from_bytes(&[0xB2, 0x87, 0xFF]),
            Some(MidiEvent::ControlChange {
                channel: 2,
                controller: 7,
                value: 127
            })
        );
    }

    #[test]
    fn test_pitch_bend_signed() {
        // Centered value on the wire decodes to 0
        let centered = MidiEvent::from_bytes(&[0xE0, 0x00, 0x40]).unwrap();
        assert_eq!(centered, MidiEvent::PitchBend { channel: 0, value: 0 });

        let lowest = MidiEvent::from_bytes(&[0xE0, 0x00, 0x00]).unwrap();
        assert_eq!(lowest, MidiEvent::PitchBend { channel: 0, value: -8192 });

        let highest = MidiEvent::from_bytes(&[0xE0, 0x7F, 0x7F]).unwrap();
        assert_eq!(highest, MidiEvent::PitchBend { channel: 0, value: 8191 });
    }

    #[test]
    fn test_pitch_bend_encoding() {
        assert_eq!(split_pitch_bend(0), (0x00, 0x40));
        assert_eq!(split_pitch_bend(-8192), (0x00, 0x00));
        assert_eq!(split_pitch_bend(8191), (0x7F, 0x7F));
        // Out of range values are clamped
        assert_eq!(split_pitch_bend(i16::MAX), (0x7F, 0x7F));

        let bytes = MidiEvent::PitchBend { channel: 1, value: 100 }.to_bytes();
        assert_eq!(bytes[0], 0xE1);
        assert_eq!(
            MidiEvent::from_bytes(&bytes).unwrap(),
            MidiEvent::PitchBend {
                channel: 1,
                value: 100
            }
        );
    }

    #[test]
    fn test_encoding_clamps_fields() {
        let bytes = MidiEvent::NoteOn {
            channel: 20,
            note: 200,
            velocity: 255,
        }
        .to_bytes();
        assert_eq!(bytes, vec![0x9F, 127, 127]);

        let bytes = MidiEvent::ControlChange {
            channel: 0,
            controller: 7,
            value: 130,
        }
        .to_bytes();
        assert_eq!(bytes, vec![0xB0, 7, 127]);
    }

    #[test]
    fn test_program_change() {
        let bytes = MidiEvent::ProgramChange { channel: 9, program: 5 }.to_bytes();
        assert_eq!(bytes, vec![0xC9, 5]);
        assert_eq!(
            MidiEvent::from_bytes(&bytes).unwrap(),
            MidiEvent::ProgramChange { channel: 9, program: 5 }
        );
    }

    #[test]
    fn test_with_channel_remaps() {
        let event = MidiEvent::NoteOn {
            channel: 0,
            note: 60,
            velocity: 90,
        };
        assert_eq!(event.with_channel(5).channel(), 5);
        assert_eq!(event.with_channel(99).channel(), 15);
    }

    #[test]
    fn test_rejects_short_and_system_messages() {
        assert!(MidiEvent::from_bytes(&[]).is_none());
        assert!(MidiEvent::from_bytes(&[0x90, 60]).is_none());
        assert!(MidiEvent::from_bytes(&[0xE0, 0x10]).is_none());
        assert!(MidiEvent::from_bytes(&[0xF0, 0x00, 0x00]).is_none());
        // Poly aftertouch is not modelled
        assert!(MidiEvent::from_bytes(&[0xA0, 60, 10]).is_none());
    }
}
