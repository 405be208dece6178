use crate::sprite::{Sprite, SpriteId};

/// Per-entity playback cursor over a sprite's frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Anim {
    pub sprite: SpriteId,
    /// Time spent on the current frame, in seconds.
    pub elapsed: f32,
    pub frame: usize,
    /// Set once a non-looping animation has shown its last frame in full.
    pub ended: bool,
}

impl Anim {
    pub fn new(sprite: SpriteId) -> Self {
        Self {
            sprite,
            elapsed: 0.0,
            frame: 0,
            ended: false,
        }
    }

    /// Switch to `sprite`, restarting playback. Returns `false` and leaves the
    /// cursor untouched when the sprite is already active.
    pub fn set_sprite(&mut self, sprite: SpriteId) -> bool {
        if self.sprite == sprite {
            return false;
        }
        *self = Self::new(sprite);
        true
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.sprite);
    }

    /// Advance playback by `dt` seconds using `sprite`'s frame durations.
    pub fn advance(&mut self, sprite: &Sprite, dt: f32, looping: bool) {
        if looping {
            self.ended = false;
        } else if self.ended {
            return;
        }
        let Some(frame) = sprite.frames.get(self.frame) else {
            self.frame = 0;
            self.elapsed = 0.0;
            return;
        };

        self.elapsed += dt;
        if self.elapsed < frame.duration {
            return;
        }
        self.elapsed = 0.0;

        let last = sprite.frames.len() - 1;
        if self.frame < last {
            self.frame += 1;
        } else if looping {
            self.frame = 0;
        } else {
            self.ended = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::PixelArena;
    use crate::sprite::Frame;

    fn three_frames() -> Sprite {
        let frame = Frame {
            duration: 0.1,
            cells: Vec::new(),
            hitbox: None,
            origin: None,
        };
        Sprite {
            width: 8,
            height: 8,
            layers: Vec::new(),
            frames: vec![frame.clone(), frame.clone(), frame],
            pixels: PixelArena::default(),
        }
    }

    fn visited(anim: &mut Anim, sprite: &Sprite, ticks: usize, looping: bool) -> Vec<usize> {
        (0..ticks)
            .map(|_| {
                let frame = anim.frame;
                anim.advance(sprite, 0.05, looping);
                frame
            })
            .collect()
    }

    #[test]
    fn looping_wraps_to_first_frame() {
        let sprite = three_frames();
        let mut anim = Anim::new(SpriteId(0));
        assert_eq!(
            visited(&mut anim, &sprite, 10, true),
            vec![0, 0, 1, 1, 2, 2, 0, 0, 1, 1]
        );
        assert!(!anim.ended);
    }

    #[test]
    fn non_looping_stops_on_last_frame() {
        let sprite = three_frames();
        let mut anim = Anim::new(SpriteId(0));
        assert_eq!(
            visited(&mut anim, &sprite, 10, false),
            vec![0, 0, 1, 1, 2, 2, 2, 2, 2, 2]
        );
        assert!(anim.ended);
        assert_eq!(anim.frame, 2);
    }

    #[test]
    fn looping_advance_clears_ended() {
        let sprite = three_frames();
        let mut anim = Anim::new(SpriteId(0));
        visited(&mut anim, &sprite, 6, false);
        assert!(anim.ended);

        anim.advance(&sprite, 0.05, true);
        assert!(!anim.ended);
        assert_eq!(anim.frame, 2);
        anim.advance(&sprite, 0.05, true);
        assert_eq!(anim.frame, 0);
    }

    #[test]
    fn set_sprite_is_idempotent() {
        let sprite = three_frames();
        let mut anim = Anim::new(SpriteId(0));
        visited(&mut anim, &sprite, 3, true);
        let before = anim;

        assert!(!anim.set_sprite(SpriteId(0)));
        assert_eq!(anim, before);

        assert!(anim.set_sprite(SpriteId(1)));
        assert_eq!(anim, Anim::new(SpriteId(1)));
        assert!(!anim.set_sprite(SpriteId(1)));
        assert_eq!(anim, Anim::new(SpriteId(1)));
    }
}
