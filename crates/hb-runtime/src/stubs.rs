//! Replacements for the engine's damage, kill, client command and shutdown
//! entry points. Each stub runs the script side and then decides whether the
//! native continuation runs.

use hb_core::{ClientCommand, DamageArgs, EntityNum, Event, HookResult, KilledArgs, VmValue};
use rhai::{Dynamic, FLOAT, INT};

use crate::bridge::Bridge;
use crate::codec::Codec;
use crate::hooks::ScriptCallback;

/// Splits the hidden marker off a chat message.
pub fn parse_chat_message(raw: &str, marker: char) -> (String, bool) {
    match raw.strip_prefix(marker) {
        Some(rest) => (rest.to_string(), true),
        None => (raw.to_string(), false),
    }
}

fn numeric_override(result: &Dynamic) -> Option<i32> {
    if result.is::<INT>() {
        let value = result.clone_cast::<INT>();
        return Some(value.clamp(INT::from(i32::MIN), INT::from(i32::MAX)) as i32);
    }
    if result.is::<FLOAT>() {
        // float to int casts saturate
        return Some(result.clone_cast::<FLOAT>() as i32);
    }
    None
}

/// Names shared by every callback of one damage or kill event.
struct HitNames {
    means_of_death: Dynamic,
    weapon: Dynamic,
    hit_location: Dynamic,
}

impl Bridge {
    fn hit_names(
        &self,
        means_of_death: i32,
        weapon: u32,
        is_alternate: bool,
        hit_loc: u32,
    ) -> HitNames {
        let host = &self.context.host;
        let name = |value: Option<String>| value.map(Dynamic::from).unwrap_or(Dynamic::UNIT);
        HitNames {
            means_of_death: name(host.means_of_death_name(means_of_death)),
            weapon: Dynamic::from(host.weapon_name(weapon, is_alternate)),
            hit_location: name(host.hit_location_name(hit_loc)),
        }
    }

    fn entity_arg(&self, codec: &Codec, entity_num: Option<EntityNum>) -> Dynamic {
        entity_num
            .and_then(|num| self.context.host.entity_by_num(num))
            .map(|entity| codec.to_script(&VmValue::Entity(entity)))
            .unwrap_or(Dynamic::UNIT)
    }

    fn vector_arg(codec: &Codec, vector: Option<[f32; 3]>) -> Dynamic {
        vector
            .map(|vector| codec.to_script(&VmValue::Vector(vector)))
            .unwrap_or(Dynamic::UNIT)
    }

    /// Runs `callbacks` in order, letting each numeric result replace the
    /// damage seen by the next one.
    fn run_damage_callbacks<F>(
        &self,
        callbacks: &[ScriptCallback],
        mut damage: i32,
        build: F,
    ) -> i32
    where
        F: Fn(&Codec, i32) -> Vec<Dynamic>,
    {
        for callback in callbacks {
            let Some(codec) = callback.codec() else {
                log::warn!("skipping callback of a torn down script runtime");
                continue;
            };
            match callback.call(build(&codec, damage)) {
                Ok(result) => {
                    if let Some(value) = numeric_override(&result) {
                        damage = value;
                    }
                }
                Err(error) => log::error!("{}", error),
            }
        }
        damage
    }

    pub fn player_damage<F>(&self, args: DamageArgs, original: F) -> HookResult
    where
        F: FnOnce(&DamageArgs),
    {
        let callbacks = self.context.damage_callbacks.borrow().clone();
        let names = self.hit_names(
            args.means_of_death,
            args.weapon,
            args.is_alternate,
            args.hit_loc,
        );

        let damage = self.run_damage_callbacks(&callbacks, args.damage, |codec, damage| {
            vec![
                self.entity_arg(codec, args.target),
                self.entity_arg(codec, args.inflictor),
                self.entity_arg(codec, args.attacker),
                Dynamic::from_int(INT::from(damage)),
                Dynamic::from_int(INT::from(args.dflags)),
                names.means_of_death.clone(),
                names.weapon.clone(),
                Self::vector_arg(codec, args.point),
                Self::vector_arg(codec, args.dir),
                names.hit_location.clone(),
            ]
        });

        if damage == 0 {
            return HookResult::Absorbed;
        }
        original(&DamageArgs { damage, ..args });
        HookResult::Forwarded
    }

    pub fn player_killed<F>(&self, args: KilledArgs, original: F) -> HookResult
    where
        F: FnOnce(&KilledArgs),
    {
        let callbacks = self.context.killed_callbacks.borrow().clone();
        let names = self.hit_names(
            args.means_of_death,
            args.weapon,
            args.is_alternate,
            args.hit_loc,
        );

        let damage = self.run_damage_callbacks(&callbacks, args.damage, |codec, damage| {
            vec![
                self.entity_arg(codec, args.target),
                self.entity_arg(codec, args.inflictor),
                self.entity_arg(codec, args.attacker),
                Dynamic::from_int(INT::from(damage)),
                names.means_of_death.clone(),
                names.weapon.clone(),
                Self::vector_arg(codec, args.dir),
                names.hit_location.clone(),
                Dynamic::from_int(INT::from(args.ps_time_offset)),
                Dynamic::from_int(INT::from(args.death_anim_duration)),
            ]
        });

        if damage == 0 {
            return HookResult::Absorbed;
        }
        original(&KilledArgs { damage, ..args });
        HookResult::Forwarded
    }

    /// Chat commands notify the level and the speaking player on the next
    /// frame. Hidden messages never reach the engine.
    pub fn client_command<F>(&self, command: &ClientCommand, original: F) -> HookResult
    where
        F: FnOnce(EntityNum),
    {
        if !self.context.options.is_chat_command(&command.name) {
            original(command.client_num);
            return HookResult::Forwarded;
        }

        let (message, hidden) =
            parse_chat_message(&command.args, self.context.options.hidden_marker);
        match self.context.host.entity_by_num(command.client_num) {
            Some(player) => {
                let level = self.context.host.level_entity();
                self.defer(vec![
                    Event::on_entity(
                        level,
                        command.name.clone(),
                        vec![VmValue::Entity(player), VmValue::String(message.clone())],
                    ),
                    Event::on_entity(player, command.name.clone(), vec![VmValue::String(message)]),
                ]);
            }
            None => log::warn!("client {} has no entity", command.client_num),
        }

        if hidden {
            return HookResult::Absorbed;
        }
        original(command.client_num);
        HookResult::Forwarded
    }

    pub fn shutdown_game<F>(&self, free_scripts: i32, original: F)
    where
        F: FnOnce(i32),
    {
        let level = self.context.host.level_entity();
        self.notify(&Event::on_entity(
            level,
            "shutdownGame_called",
            vec![VmValue::Int(1)],
        ));
        original(free_scripts);
    }
}
