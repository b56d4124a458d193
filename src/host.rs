// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Generates the source the host runs: the tick scheduler, the music engine that decodes
//! blocks, and the snippet that fetches a song's blocks and plays it.

use std::fmt;
use std::str::FromStr;

use crate::codec::{Codec, LOUDNESS_LEVELS, WORD_WIDTH};
use crate::config;
use crate::palette::{A4_INDEX, PIANO_KEYS, SOUND_PROFILES};
use crate::runtime::trigger_capacity;

/// The line to call from an existing tick function instead of installing one.
pub const TICK_CORE: &str = "S.step();";

/// Errors raised while reading block coordinates.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum HostError {
    #[error("invalid coordinate '{0}', expected x,y,z")]
    Coordinate(String),
    #[error("no coordinates given")]
    NoCoordinates,
}

/// Where a block is stored in the host world.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Coordinate {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl FromStr for Coordinate {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<i64> = s
            .split(',')
            .map(|part| part.trim().parse::<i64>())
            .collect::<Result<_, _>>()
            .map_err(|_| HostError::Coordinate(s.to_string()))?;
        match parts.as_slice() {
            [x, y, z] => Ok(Coordinate {
                x: *x,
                y: *y,
                z: *z,
            }),
            _ => Err(HostError::Coordinate(s.to_string())),
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

/// Parses a `;` separated list of coordinates, in block order.
pub fn parse_coordinates(s: &str) -> Result<Vec<Coordinate>, HostError> {
    let coordinates = s
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(Coordinate::from_str)
        .collect::<Result<Vec<_>, _>>()?;
    if coordinates.is_empty() {
        return Err(HostError::NoCoordinates);
    }
    Ok(coordinates)
}

/// Renders a list of values as a JavaScript array literal.
fn js_array<T: fmt::Display>(values: impl IntoIterator<Item = T>) -> String {
    let items: Vec<String> = values.into_iter().map(|value| value.to_string()).collect();
    format!("[{}]", items.join(","))
}

/// Quotes a string as a JavaScript literal.
fn js_string(value: &str) -> String {
    // Any string serializes to JSON, which is valid JavaScript.
    serde_json::to_string(value).unwrap_or_else(|_| String::from("\"\""))
}

/// The tick scheduler. Tasks are bucketed by tick as [action, tag, stamp] and a tag's fence
/// in `S.g` skips every task stamped before it. `S.n` counts the live tasks already taken from
/// the running tick and `S.L(k)` is the live load of tick `k`.
fn scheduler_code(max_tasks_per_tick: usize) -> String {
    [
        format!("S={{t:{{}},g:{{}},c:0,o:0,n:0,m:{max_tasks_per_tick},"),
        "run(f,d,g){let k=S.c+d;(S.t[k]=S.t[k]||[]).push([f,g,S.o++])},".to_string(),
        "stop(g){S.g[g]=S.o++},".to_string(),
        "v(q){let n=0;for(const e of q)if(!(e[1]&&e[2]<S.g[e[1]]))n++;return n},".to_string(),
        "L(k){return(k==S.c?S.n:0)+(S.t[k]?S.v(S.t[k]):0)},".to_string(),
        "step(){let c=S.c,n=0,q;S.n=0;try{while(q=S.t[c]){delete S.t[c];S.n+=S.v(q);".to_string(),
        "for(let j=0;j<q.length;j++){let e=q[j];if(e[1]&&e[2]<S.g[e[1]])continue;".to_string(),
        "if(++n>S.m)throw new Error(\"tick \"+c+\" over budget\");e[0]()}}}".to_string(),
        "finally{delete S.t[c];S.c=c+1;S.n=0}}};".to_string(),
    ]
    .concat()
}

/// The music engine. Decoding mirrors the Rust runtime: one batch per task, fillers only move
/// time and decoding parks until the next event is inside the lookahead window. An event whose
/// tick is full waits for the next tick with room.
fn music_code(codec: &Codec, runtime: &config::Runtime) -> String {
    let names = SOUND_PROFILES.iter().map(|sound| js_string(sound.name()));
    let pitches = SOUND_PROFILES.iter().map(|sound| sound.natural_pitch_hz());
    [
        "this.Music={".to_string(),
        format!(
            "D:(()=>{{let d={{}},c={};for(let i=0;i<c.length;i++)d[c[i]]=i;return d}})(),",
            js_string(codec.charset())
        ),
        format!("SND:{},", js_array(names)),
        format!("NAT:{},", js_array(pitches)),
        format!("VOL:{},", js_array(LOUDNESS_LEVELS)),
        format!(
            "w(s,i){{let v=0;for(let k=0;k<{WORD_WIDTH};k++)v=v*{}+this.D[s[i+k]];return v}},",
            codec.base()
        ),
        "play(B){S.stop(\"music\");S.stop(\"decode\");".to_string(),
        "let M=this,b=-1,s=\"\",i=0,e=0,T=0,t0=S.c;".to_string(),
        format!("const f=()=>{{for(let c=0;c<{};c++){{", runtime.batch_size()),
        format!(
            "while(i>=e){{if(++b>=B.length)return;s=B[b];e={WORD_WIDTH}+M.w(s,0);i={WORD_WIDTH}}}"
        ),
        format!("let v=M.w(s,i),d=v%{0};", codec.max_delay()),
        format!(
            "if(t0+T+d>S.c+{0}){{S.run(f,t0+T+d-{0}-S.c,\"decode\");return}}",
            runtime.lookahead_ticks()
        ),
        format!(
            "v=(v-d)/{};let n=v%{PIANO_KEYS};v=(v-n)/{PIANO_KEYS};",
            codec.max_delay()
        ),
        format!(
            "let l=v%{0},x=(v-l)/{0};if(l=={1}){{i+={WORD_WIDTH};T+=d;continue}}",
            codec.loudness_levels(),
            codec.filler_loudness()
        ),
        "let k=t0+T+d-S.c;if(k<0)k=0;".to_string(),
        format!(
            "if(S.L(S.c+k)>={}){{S.run(f,k>1?k:1,\"decode\");return}}",
            trigger_capacity(runtime.max_tasks_per_tick())
        ),
        format!("i+={WORD_WIDTH};T+=d;"),
        format!(
            "S.run(()=>api.broadcastSound(M.SND[x],M.VOL[l],440*Math.pow(2,(n-{A4_INDEX})/12)/M.NAT[x]),k,\"music\")}}"
        ),
        "S.run(f,1,\"decode\")};S.run(f,0,\"decode\")},".to_string(),
        "stop(){S.stop(\"music\");S.stop(\"decode\")}};".to_string(),
    ]
    .concat()
}

/// Reports the coordinates of every block a player changes, so an operator can collect the
/// coordinates of the blocks holding a song. Remove it once the coordinates are known.
const DISCOVERY_CODE: &str =
    "onPlayerChangeBlock=(p,x,y,z)=>{api.sendMessage(p,\"block at \"+x+\",\"+y+\",\"+z)};";

/// The setup source: scheduler, music engine, coordinate helper and, unless the world already
/// has a tick function that calls [`TICK_CORE`], a tick function.
pub fn setup_code(codec: &Codec, runtime: &config::Runtime, has_tick: bool) -> String {
    let mut code = scheduler_code(runtime.max_tasks_per_tick());
    if !has_tick {
        code.push_str(&format!("tick=()=>{{{TICK_CORE}}};"));
    }
    code.push_str(&music_code(codec, runtime));
    code.push_str(DISCOVERY_CODE);
    code
}

/// The snippet that reads a song's blocks from the given coordinates, in order, and plays it.
pub fn runner_code(coordinates: &[Coordinate]) -> String {
    let mut code = String::new();
    for (index, coordinate) in coordinates.iter().enumerate() {
        code.push_str(&format!(
            "let p{index}=api.getBlockData({},{},{}).persisted.shared.text;",
            coordinate.x, coordinate.y, coordinate.z
        ));
    }
    let blocks = js_array((0..coordinates.len()).map(|index| format!("p{index}")));
    code.push_str(&format!("S.run(()=>Music.play({blocks}),0);"));
    code
}
